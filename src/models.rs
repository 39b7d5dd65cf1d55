use crate::api::ApiError;
use crate::imports::FileEntry;
use crate::plot::PlotTrace;
use crate::poller::ImportPoller;
use poll_promise::Promise;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Starting,
    Importing,
    Completed,
    Failed,
    #[serde(other)]
    Pending,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ProcessingStatus::Starting | ProcessingStatus::Importing)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingStatus::Starting => "starting",
            ProcessingStatus::Importing => "importing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Pending => "pending",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub n_cells: i64,
    pub n_genes: i64,
    #[serde(default)]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default)]
    pub imported_cells: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetListResponse {
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub total_count: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub n_cells: i64,
    pub n_genes: i64,
    #[serde(default)]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default)]
    pub imported_cells: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetSummary {
    pub dataset_info: DatasetInfo,
    #[serde(default)]
    pub n_clusters: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CellData {
    pub cell_barcode: String,
    pub umap_1: f64,
    pub umap_2: f64,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub cell_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UmapResponse {
    pub cells: Vec<CellData>,
    #[serde(default)]
    pub total_cells: Option<i64>,
    #[serde(default)]
    pub query_duration_ms: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkerGene {
    pub cluster_id: String,
    pub gene_symbol: String,
    #[serde(default)]
    pub log2_fold_change: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkerGenesResponse {
    pub marker_genes: Vec<MarkerGene>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExpressionResponse {
    pub values: Vec<f64>,
    #[serde(default)]
    pub gene_symbol: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GeneMatch {
    pub gene_symbol: String,
    #[serde(default)]
    pub mean_expression: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GeneSearchResponse {
    pub genes: Vec<GeneMatch>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanResponse {
    pub files: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImportRequest {
    pub file_path: String,
    pub name: String,
    pub import_expression: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImportResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct AppState {
    pub selected_tab: Tab,

    pub datasets: Vec<Dataset>,
    pub datasets_promise: Option<Promise<Result<DatasetListResponse, ApiError>>>,
    pub is_fetching_datasets: bool,
    pub datasets_error: Option<String>,
    pub datasets_dirty: bool,

    pub selected_dataset: Option<String>,
    pub dataset_generation: u64,

    pub umap_promise: Option<(u64, Promise<Result<(UmapResponse, u64), ApiError>>)>,
    pub is_fetching_umap: bool,
    pub umap_error: Option<String>,
    pub cells: Vec<CellData>,
    pub base_trace: Option<PlotTrace>,
    pub overlay_trace: Option<PlotTrace>,
    pub query_ms: Option<u64>,
    pub network_ms: Option<u64>,
    pub total_ms: Option<u64>,

    pub gene_query: String,
    pub expression_promise: Option<(u64, String, Promise<Result<ExpressionResponse, ApiError>>)>,
    pub is_fetching_expression: bool,
    pub expression_error: Option<String>,
    pub suggest_promise: Option<Promise<Result<GeneSearchResponse, ApiError>>>,
    pub gene_suggestions: Vec<String>,

    pub markers_promise: Option<(u64, Promise<Result<MarkerGenesResponse, ApiError>>)>,
    pub is_fetching_markers: bool,
    pub markers_error: Option<String>,
    pub marker_groups: Vec<(String, Vec<MarkerGene>)>,

    pub pending_delete: Option<String>,
    pub delete_promise: Option<(String, Promise<Result<(), ApiError>>)>,
    pub delete_error: Option<String>,

    pub files: Vec<FileEntry>,
    pub scan_promise: Option<Promise<Result<ScanResponse, ApiError>>>,
    pub is_scanning: bool,
    pub file_error: Option<String>,
    pub import_promises: Vec<(String, String, Promise<Result<ImportResponse, ApiError>>)>,
    pub poller: ImportPoller,

    pub debug_output: String,
    pub debug_panel_height: f32,
    pub debug_panel_visible: bool,
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            selected_tab: Tab::Umap,
            datasets: Vec::new(),
            datasets_promise: None,
            is_fetching_datasets: false,
            datasets_error: None,
            datasets_dirty: true,
            selected_dataset: None,
            dataset_generation: 0,
            umap_promise: None,
            is_fetching_umap: false,
            umap_error: None,
            cells: Vec::new(),
            base_trace: None,
            overlay_trace: None,
            query_ms: None,
            network_ms: None,
            total_ms: None,
            gene_query: String::new(),
            expression_promise: None,
            is_fetching_expression: false,
            expression_error: None,
            suggest_promise: None,
            gene_suggestions: Vec::new(),
            markers_promise: None,
            is_fetching_markers: false,
            markers_error: None,
            marker_groups: Vec::new(),
            pending_delete: None,
            delete_promise: None,
            delete_error: None,
            files: Vec::new(),
            scan_promise: None,
            is_scanning: false,
            file_error: None,
            import_promises: Vec::new(),
            poller: ImportPoller::new_with_api(),
            debug_output: String::new(),
            debug_panel_height: 150.0,
            debug_panel_visible: true,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Tab {
    Umap,
    Files,
    Datasets,
}
