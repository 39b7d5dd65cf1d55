use crate::models::{
    DatasetListResponse, DatasetSummary, ExpressionResponse, GeneSearchResponse, ImportRequest,
    ImportResponse, MarkerGenesResponse, ScanResponse, UmapResponse,
};
use poll_promise::Promise;
use std::time::{Duration, Instant};
use thiserror::Error;

lazy_static::lazy_static! {
    static ref CLIENT: reqwest::blocking::Client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client");
}

pub fn base_url() -> String {
    dotenv::var("CELLSCOPE_API_URL").unwrap_or_else(|_| "http://localhost:8000/api/v1/sc".to_string())
}

pub fn admin_url() -> String {
    dotenv::var("CELLSCOPE_ADMIN_URL")
        .unwrap_or_else(|_| "http://localhost:8000/api/v1/sc/admin".to_string())
}

pub fn scan_dir() -> String {
    dotenv::var("CELLSCOPE_SCAN_DIR").unwrap_or_else(|_| "/data/h5ad".to_string())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
}

fn detail_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(|s| s.to_string()))
        .unwrap_or_else(|| body.trim().to_string())
}

fn status_error(status: u16, body: &str) -> ApiError {
    let detail = detail_from_body(body);
    if status == 404 {
        ApiError::NotFound(detail)
    } else {
        ApiError::Server { status, detail }
    }
}

fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn get_json<T: serde::de::DeserializeOwned>(
    url: &str,
    params: &[(&str, String)],
) -> Result<T, ApiError> {
    let response = CLIENT
        .get(url)
        .query(params)
        .send()
        .map_err(|e| ApiError::Network(e.to_string()))?;
    check(response)?
        .json::<T>()
        .map_err(|e| ApiError::Network(format!("invalid response body: {e}")))
}

pub fn list_datasets() -> Result<DatasetListResponse, ApiError> {
    get_json(&format!("{}/datasets", base_url()), &[])
}

pub fn get_dataset_summary(dataset_name: &str) -> Result<DatasetSummary, ApiError> {
    get_json(&format!("{}/datasets/{}", base_url(), dataset_name), &[])
}

pub fn delete_dataset(dataset_name: &str) -> Result<(), ApiError> {
    let response = CLIENT
        .delete(format!("{}/datasets/{}", admin_url(), dataset_name))
        .send()
        .map_err(|e| ApiError::Network(e.to_string()))?;
    check(response)?;
    Ok(())
}

pub fn get_umap_data(
    dataset_name: &str,
    cluster_ids: Option<&[String]>,
    sample_rate: Option<f64>,
) -> Result<UmapResponse, ApiError> {
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(ids) = cluster_ids {
        params.push(("cluster_ids", ids.join(",")));
    }
    if let Some(rate) = sample_rate {
        params.push(("sample_rate", rate.to_string()));
    }
    get_json(&format!("{}/umap/{}", base_url(), dataset_name), &params)
}

pub fn get_marker_genes(
    dataset_name: &str,
    cluster_id: Option<&str>,
    top_n: usize,
) -> Result<MarkerGenesResponse, ApiError> {
    let mut params: Vec<(&str, String)> = vec![("top_n", top_n.to_string())];
    if let Some(id) = cluster_id {
        params.push(("cluster_id", id.to_string()));
    }
    get_json(&format!("{}/markers/{}", base_url(), dataset_name), &params)
}

pub fn get_gene_expression(
    dataset_name: &str,
    gene_symbol: &str,
) -> Result<ExpressionResponse, ApiError> {
    get_json(
        &format!("{}/expression/{}/{}", base_url(), dataset_name, gene_symbol),
        &[],
    )
}

pub fn search_genes(
    dataset_name: &str,
    query: &str,
    limit: usize,
) -> Result<GeneSearchResponse, ApiError> {
    get_json(
        &format!("{}/genes/{}/search", base_url(), dataset_name),
        &[("q", query.to_string()), ("limit", limit.to_string())],
    )
}

pub fn scan_files(directory: &str) -> Result<ScanResponse, ApiError> {
    get_json(
        &format!("{}/files/scan", admin_url()),
        &[("directory", directory.to_string())],
    )
}

pub fn import_file(
    file_path: &str,
    dataset_name: &str,
    overwrite: bool,
    import_expression: bool,
) -> Result<ImportResponse, ApiError> {
    let endpoint = if overwrite { "/import/overwrite" } else { "/import" };
    let request = ImportRequest {
        file_path: file_path.to_string(),
        name: dataset_name.to_string(),
        import_expression,
    };
    let response = CLIENT
        .post(format!("{}{}", admin_url(), endpoint))
        .json(&request)
        .send()
        .map_err(|e| ApiError::Network(e.to_string()))?;
    check(response)?
        .json::<ImportResponse>()
        .map_err(|e| ApiError::Network(format!("invalid response body: {e}")))
}

pub fn list_datasets_promise() -> Promise<Result<DatasetListResponse, ApiError>> {
    Promise::spawn_thread("list_datasets_request", list_datasets)
}

pub fn umap_data_promise(dataset_name: String) -> Promise<Result<(UmapResponse, u64), ApiError>> {
    Promise::spawn_thread("umap_request", move || {
        let started = Instant::now();
        let response = get_umap_data(&dataset_name, None, None)?;
        Ok((response, started.elapsed().as_millis() as u64))
    })
}

pub fn marker_genes_promise(dataset_name: String) -> Promise<Result<MarkerGenesResponse, ApiError>> {
    Promise::spawn_thread("marker_genes_request", move || {
        get_marker_genes(&dataset_name, None, 5)
    })
}

pub fn gene_expression_promise(
    dataset_name: String,
    gene_symbol: String,
) -> Promise<Result<ExpressionResponse, ApiError>> {
    Promise::spawn_thread("gene_expression_request", move || {
        get_gene_expression(&dataset_name, &gene_symbol)
    })
}

pub fn search_genes_promise(
    dataset_name: String,
    query: String,
) -> Promise<Result<GeneSearchResponse, ApiError>> {
    Promise::spawn_thread("gene_search_request", move || {
        search_genes(&dataset_name, &query, 10)
    })
}

pub fn scan_files_promise() -> Promise<Result<ScanResponse, ApiError>> {
    Promise::spawn_thread("scan_files_request", move || scan_files(&scan_dir()))
}

pub fn import_file_promise(
    file_path: String,
    dataset_name: String,
) -> Promise<Result<ImportResponse, ApiError>> {
    // Overwrite is always enabled: re-importing a name replaces the dataset.
    Promise::spawn_thread("import_file_request", move || {
        import_file(&file_path, &dataset_name, true, false)
    })
}

pub fn delete_dataset_promise(dataset_name: String) -> Promise<Result<(), ApiError>> {
    Promise::spawn_thread("delete_dataset_request", move || {
        delete_dataset(&dataset_name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetSummary, ProcessingStatus};

    #[test]
    fn test_status_error_maps_404_to_not_found() {
        let err = status_error(404, r#"{"detail": "Dataset 'pbmc' not found"}"#);
        assert_eq!(err, ApiError::NotFound("Dataset 'pbmc' not found".to_string()));
    }

    #[test]
    fn test_status_error_maps_other_statuses_to_server() {
        let err = status_error(500, r#"{"detail": "boom"}"#);
        assert_eq!(
            err,
            ApiError::Server {
                status: 500,
                detail: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_status_error_falls_back_to_raw_body() {
        let err = status_error(502, "Bad Gateway\n");
        assert_eq!(
            err,
            ApiError::Server {
                status: 502,
                detail: "Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn test_dataset_summary_parses_unknown_status_as_pending() {
        let summary: DatasetSummary = serde_json::from_str(
            r#"{
                "dataset_info": {
                    "id": 3,
                    "name": "pbmc",
                    "n_cells": 2700,
                    "n_genes": 13714,
                    "processing_status": "pending",
                    "imported_cells": 0
                },
                "n_clusters": 9
            }"#,
        )
        .unwrap();
        assert_eq!(
            summary.dataset_info.processing_status,
            Some(ProcessingStatus::Pending)
        );
        assert!(!summary.dataset_info.processing_status.unwrap().is_active());
    }

    #[test]
    fn test_import_status_round_trip() {
        let status: ProcessingStatus = serde_json::from_str(r#""importing""#).unwrap();
        assert_eq!(status, ProcessingStatus::Importing);
        assert!(status.is_active());
        assert!(!status.is_terminal());
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(ProcessingStatus::Failed.is_terminal());
    }
}
