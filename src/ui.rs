use crate::api::{self, ApiError};
use crate::imports;
use crate::models::{AppState, ExpressionResponse, MarkerGene, ProcessingStatus, Tab, UmapResponse};
use crate::plot;
use eframe::egui;
use eframe::egui::{Color32, Ui};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Legend, Plot, Points};
use std::time::{Duration, Instant};

pub fn update_debug_panel(state: &mut AppState, message: &str) {
    state.debug_output.push_str(message);
    state.debug_output.push('\n');
}

// Resolves finished promises and drives the import poller. Runs once per
// frame, before any panel, so background work continues no matter which
// tab is visible.
pub fn process_background(ctx: &egui::Context, state: &mut AppState) {
    if state.datasets_dirty && state.datasets_promise.is_none() {
        state.datasets_dirty = false;
        state.is_fetching_datasets = true;
        state.datasets_promise = Some(api::list_datasets_promise());
    }

    let ready = state
        .datasets_promise
        .as_ref()
        .and_then(|promise| promise.ready().cloned());
    if let Some(result) = ready {
        state.datasets_promise = None;
        state.is_fetching_datasets = false;
        match result {
            Ok(response) => {
                state.datasets = response.datasets;
                state.datasets_error = None;
            }
            Err(err) => {
                state.datasets_error =
                    Some("Failed to fetch datasets. Is the API server running?".to_string());
                update_debug_panel(state, &format!("dataset list fetch failed: {err}"));
            }
        }
        ctx.request_repaint();
    }

    let completed = state.poller.pump(Instant::now());
    for name in completed {
        update_debug_panel(state, &format!("import completed: {name}"));
        state.datasets_dirty = true;
    }
    if state.poller.is_polling() {
        ctx.request_repaint_after(Duration::from_millis(250));
    }

    let mut finished_imports = Vec::new();
    for (i, (_, _, promise)) in state.import_promises.iter().enumerate() {
        if let Some(result) = promise.ready() {
            finished_imports.push((i, result.clone()));
        }
    }
    for (i, result) in finished_imports.into_iter().rev() {
        let (name, filename, _) = state.import_promises.remove(i);
        match imports::finish_import(&name, &filename, result, &mut state.poller) {
            Some(message) => {
                update_debug_panel(state, &message);
                state.file_error = Some(message);
            }
            None => {
                update_debug_panel(state, &format!("import accepted for {name}, polling status"));
            }
        }
        ctx.request_repaint();
    }

    let ready = state
        .scan_promise
        .as_ref()
        .and_then(|promise| promise.ready().cloned());
    if let Some(result) = ready {
        state.scan_promise = None;
        state.is_scanning = false;
        match result {
            Ok(response) => {
                state.poller.clear();
                state.import_promises.clear();
                let count = response.files.len();
                state.files = imports::apply_scan(response.files, &api::scan_dir());
                state.file_error = None;
                update_debug_panel(state, &format!("scan found {count} file(s)"));
            }
            Err(err) => {
                state.file_error = Some(format!("Failed to scan files: {err}"));
            }
        }
        ctx.request_repaint();
    }

    let ready = state
        .delete_promise
        .as_ref()
        .and_then(|(name, promise)| promise.ready().map(|r| (name.clone(), r.clone())));
    if let Some((name, result)) = ready {
        state.delete_promise = None;
        match result {
            Ok(()) => {
                update_debug_panel(state, &format!("deleted dataset: {name}"));
                state.datasets_dirty = true;
                state.delete_error = None;
                if state.selected_dataset.as_deref() == Some(name.as_str()) {
                    state.selected_dataset = None;
                    reset_dataset_view(state);
                }
            }
            Err(err) => {
                state.delete_error = Some(format!("Failed to delete dataset: {err}"));
            }
        }
        ctx.request_repaint();
    }

    let ready = state
        .umap_promise
        .as_ref()
        .and_then(|(generation, promise)| promise.ready().map(|r| (*generation, r.clone())));
    if let Some((generation, result)) = ready {
        state.umap_promise = None;
        apply_umap_result(state, generation, result);
        ctx.request_repaint();
    }

    let ready = state.expression_promise.as_ref().and_then(|(generation, gene, promise)| {
        promise
            .ready()
            .map(|r| (*generation, gene.clone(), r.clone()))
    });
    if let Some((generation, gene, result)) = ready {
        state.expression_promise = None;
        apply_expression_result(state, generation, &gene, result);
        ctx.request_repaint();
    }

    let ready = state
        .markers_promise
        .as_ref()
        .and_then(|(generation, promise)| promise.ready().map(|r| (*generation, r.clone())));
    if let Some((generation, result)) = ready {
        state.markers_promise = None;
        if generation == state.dataset_generation {
            state.is_fetching_markers = false;
            match result {
                Ok(response) => {
                    state.marker_groups = group_markers(response.marker_genes);
                    state.markers_error = None;
                }
                Err(err) => {
                    state.markers_error = Some("Failed to fetch marker genes.".to_string());
                    update_debug_panel(state, &format!("marker gene fetch failed: {err}"));
                }
            }
        }
        ctx.request_repaint();
    }

    let ready = state
        .suggest_promise
        .as_ref()
        .and_then(|promise| promise.ready().cloned());
    if let Some(result) = ready {
        state.suggest_promise = None;
        match result {
            Ok(response) => {
                state.gene_suggestions = response
                    .genes
                    .into_iter()
                    .map(|gene| gene.gene_symbol)
                    .collect();
            }
            Err(err) => {
                state.expression_error = Some(format!("Gene search failed: {err}"));
            }
        }
        ctx.request_repaint();
    }

    let pending = state.datasets_promise.is_some()
        || state.scan_promise.is_some()
        || state.delete_promise.is_some()
        || state.umap_promise.is_some()
        || state.expression_promise.is_some()
        || state.markers_promise.is_some()
        || state.suggest_promise.is_some()
        || !state.import_promises.is_empty();
    if pending {
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

// Stale guard: a response tagged with an older generation belongs to a
// previously selected dataset and must not touch the current view.
pub fn apply_umap_result(
    state: &mut AppState,
    generation: u64,
    result: Result<(UmapResponse, u64), ApiError>,
) {
    if generation != state.dataset_generation {
        return;
    }
    state.is_fetching_umap = false;
    match result {
        Ok((response, total_ms)) => {
            let query_ms = response.query_duration_ms.unwrap_or(0);
            state.query_ms = Some(query_ms);
            state.network_ms = Some(total_ms.saturating_sub(query_ms));
            state.total_ms = Some(total_ms);
            state.cells = response.cells;
            state.base_trace = Some(plot::build_base_trace(&state.cells));
            state.overlay_trace = None;
            state.umap_error = None;
        }
        Err(err) => {
            state.umap_error = Some("Failed to fetch UMAP data.".to_string());
            update_debug_panel(state, &format!("umap fetch failed: {err}"));
        }
    }
}

pub fn apply_expression_result(
    state: &mut AppState,
    generation: u64,
    gene: &str,
    result: Result<ExpressionResponse, ApiError>,
) {
    if generation != state.dataset_generation {
        return;
    }
    state.is_fetching_expression = false;
    match result {
        Ok(response) => {
            let outcome = state
                .base_trace
                .as_ref()
                .map(|base| plot::apply_expression_overlay(base, &response.values));
            match outcome {
                Some(Ok(trace)) => {
                    state.overlay_trace = Some(trace);
                    state.expression_error = None;
                }
                Some(Err(err)) => {
                    state.expression_error = Some(err.to_string());
                }
                None => {
                    state.expression_error = Some("No UMAP plot loaded yet.".to_string());
                }
            }
        }
        Err(err) => {
            state.expression_error =
                Some(format!("Gene '{gene}' not found or error fetching data."));
            state.overlay_trace = None;
            update_debug_panel(state, &format!("expression fetch failed: {err}"));
        }
    }
}

pub fn group_markers(genes: Vec<MarkerGene>) -> Vec<(String, Vec<MarkerGene>)> {
    let mut groups: Vec<(String, Vec<MarkerGene>)> = Vec::new();
    for gene in genes {
        match groups
            .iter_mut()
            .find(|(cluster, _)| *cluster == gene.cluster_id)
        {
            Some((_, list)) => list.push(gene),
            None => groups.push((gene.cluster_id.clone(), vec![gene])),
        }
    }
    groups
}

fn reset_dataset_view(state: &mut AppState) {
    state.dataset_generation += 1;
    state.umap_promise = None;
    state.expression_promise = None;
    state.markers_promise = None;
    state.is_fetching_umap = false;
    state.is_fetching_expression = false;
    state.is_fetching_markers = false;
    state.cells.clear();
    state.base_trace = None;
    state.overlay_trace = None;
    state.query_ms = None;
    state.network_ms = None;
    state.total_ms = None;
    state.umap_error = None;
    state.expression_error = None;
    state.markers_error = None;
    state.marker_groups.clear();
    state.gene_suggestions.clear();
}

pub fn select_dataset(state: &mut AppState, name: String) {
    if state.selected_dataset.as_deref() == Some(name.as_str()) {
        return;
    }
    state.selected_dataset = Some(name);
    reset_dataset_view(state);
    start_dataset_fetches(state);
}

fn start_dataset_fetches(state: &mut AppState) {
    let Some(name) = state.selected_dataset.clone() else {
        return;
    };
    state.is_fetching_umap = true;
    state.umap_promise = Some((state.dataset_generation, api::umap_data_promise(name.clone())));
    state.is_fetching_markers = true;
    state.markers_promise = Some((state.dataset_generation, api::marker_genes_promise(name)));
}

fn trigger_expression_search(state: &mut AppState) {
    let Some(dataset) = state.selected_dataset.clone() else {
        state.expression_error =
            Some("Please select a dataset and enter a gene symbol.".to_string());
        return;
    };
    let gene = state.gene_query.trim().to_string();
    if gene.is_empty() {
        state.expression_error =
            Some("Please select a dataset and enter a gene symbol.".to_string());
        return;
    }
    state.is_fetching_expression = true;
    state.expression_error = None;
    state.expression_promise = Some((
        state.dataset_generation,
        gene.clone(),
        api::gene_expression_promise(dataset, gene),
    ));
}

pub fn tab_bar(ui: &mut egui::Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        for &tab in &[Tab::Umap, Tab::Files, Tab::Datasets] {
            let label = format!("{:?}", tab);
            if ui
                .selectable_label(state.selected_tab == tab, label)
                .clicked()
            {
                state.selected_tab = tab;
            }
        }
    });
}

pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.label("Select a Dataset");
    if state.is_fetching_datasets {
        ui.label("Loading datasets...");
    } else if let Some(err) = &state.datasets_error {
        ui.colored_label(Color32::RED, err.clone());
    }

    let mut chosen: Option<String> = None;
    egui::ComboBox::from_id_source("dataset_select")
        .selected_text(
            state
                .selected_dataset
                .clone()
                .unwrap_or_else(|| "Choose a dataset".to_string()),
        )
        .show_ui(ui, |ui| {
            for dataset in &state.datasets {
                let label = format!("{} ({} cells)", dataset.name, dataset.n_cells);
                if ui
                    .selectable_label(
                        state.selected_dataset.as_deref() == Some(dataset.name.as_str()),
                        label,
                    )
                    .clicked()
                {
                    chosen = Some(dataset.name.clone());
                }
            }
        });
    if let Some(name) = chosen {
        select_dataset(state, name);
    }

    ui.separator();
    gene_search_section(ui, state);
    ui.separator();
    cluster_info_section(ui, state);
}

fn gene_search_section(ui: &mut Ui, state: &mut AppState) {
    ui.label("Gene Expression");

    let has_dataset = state.selected_dataset.is_some();
    let text_response = ui.add_enabled(
        has_dataset,
        egui::TextEdit::singleline(&mut state.gene_query).hint_text("e.g., CD3D"),
    );
    if text_response.changed() {
        state.gene_query = state.gene_query.to_uppercase();
    }
    let submitted =
        text_response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

    let mut search_clicked = false;
    let mut suggest_clicked = false;
    let mut clear_clicked = false;
    ui.horizontal(|ui| {
        let search_label = if state.is_fetching_expression {
            "Searching..."
        } else {
            "Search"
        };
        search_clicked = ui
            .add_enabled(
                has_dataset && !state.is_fetching_expression,
                egui::Button::new(search_label),
            )
            .clicked();
        suggest_clicked = ui
            .add_enabled(has_dataset, egui::Button::new("Suggest"))
            .clicked();
        clear_clicked = ui
            .add_enabled(has_dataset, egui::Button::new("Clear"))
            .clicked();
    });

    if search_clicked || submitted {
        trigger_expression_search(state);
    }
    if suggest_clicked {
        let query = state.gene_query.trim().to_string();
        if let Some(dataset) = state.selected_dataset.clone() {
            if query.is_empty() {
                state.expression_error =
                    Some("Please select a dataset and enter a gene symbol.".to_string());
            } else {
                state.suggest_promise = Some(api::search_genes_promise(dataset, query));
            }
        }
    }
    if clear_clicked {
        state.gene_query.clear();
        state.expression_error = None;
        state.overlay_trace = None;
        state.gene_suggestions.clear();
    }

    if !state.gene_suggestions.is_empty() {
        let mut picked: Option<String> = None;
        ui.horizontal_wrapped(|ui| {
            for symbol in &state.gene_suggestions {
                if ui.small_button(symbol).clicked() {
                    picked = Some(symbol.clone());
                }
            }
        });
        if let Some(symbol) = picked {
            state.gene_query = symbol;
            state.gene_suggestions.clear();
        }
    }

    if let Some(err) = &state.expression_error {
        ui.colored_label(Color32::RED, err.clone());
    }
}

fn cluster_info_section(ui: &mut Ui, state: &mut AppState) {
    if state.selected_dataset.is_none() {
        return;
    }
    if state.is_fetching_markers {
        ui.label("Loading cluster info...");
        return;
    }
    if let Some(err) = &state.markers_error {
        ui.colored_label(Color32::RED, err.clone());
        return;
    }
    if state.marker_groups.is_empty() {
        return;
    }

    ui.label("Top 5 Marker Genes per Cluster");
    for (cluster_id, genes) in &state.marker_groups {
        egui::CollapsingHeader::new(format!("Cluster {cluster_id}")).show(ui, |ui| {
            for gene in genes {
                ui.horizontal(|ui| {
                    ui.label(&gene.gene_symbol);
                    let log2fc = gene
                        .log2_fold_change
                        .map(|v| format!("{v:.2}"))
                        .unwrap_or_else(|| "N/A".to_string());
                    ui.weak(format!("log2fc: {log2fc}"));
                });
            }
        });
    }
}

pub fn umap_tab(ui: &mut Ui, state: &mut AppState) {
    let Some(dataset_name) = state.selected_dataset.clone() else {
        ui.centered_and_justified(|ui| {
            ui.label("Select a dataset to view the UMAP plot.");
        });
        return;
    };

    if state.is_fetching_umap {
        ui.label("Loading UMAP plot...");
        return;
    }
    if let Some(err) = &state.umap_error {
        ui.colored_label(Color32::RED, err.clone());
        return;
    }
    if state.base_trace.is_none() {
        ui.label("Select a dataset to view the UMAP plot.");
        return;
    }

    ui.heading(format!("UMAP of {dataset_name}"));
    if let (Some(query), Some(network), Some(total)) =
        (state.query_ms, state.network_ms, state.total_ms)
    {
        ui.weak(format!(
            "DB Query: {query} ms | Network: {network} ms | Total: {total} ms"
        ));
    }

    let Some(trace) = state.overlay_trace.as_ref().or(state.base_trace.as_ref()) else {
        return;
    };
    let groups = plot::series(trace);

    let mut hover: Option<(f64, f64)> = None;
    Plot::new("umap_plot")
        .data_aspect(1.0)
        .legend(Legend::default())
        .x_axis_label("UMAP 1")
        .y_axis_label("UMAP 2")
        .show(ui, |plot_ui| {
            for group in &groups {
                let mut points = Points::new(group.points.clone())
                    .color(group.color)
                    .radius(2.0);
                if let Some(label) = &group.label {
                    points = points.name(label);
                }
                plot_ui.points(points);
            }
            if plot_ui.response().hovered() {
                if let Some(coord) = plot_ui.pointer_coordinate() {
                    hover = Some((coord.x, coord.y));
                }
            }
        });

    if let Some((x, y)) = hover {
        if let Some(i) = plot::nearest_cell(&state.cells, x, y) {
            let cell = &state.cells[i];
            ui.weak(format!(
                "Cell: {} | Cluster: {} | Cell Type: {} | UMAP-1: {:.3} | UMAP-2: {:.3}",
                cell.cell_barcode,
                cell.cluster_id.as_deref().unwrap_or("N/A"),
                cell.cell_type.as_deref().unwrap_or("N/A"),
                cell.umap_1,
                cell.umap_2
            ));
        }
    }
}

pub fn files_tab(ui: &mut Ui, state: &mut AppState) {
    ui.heading("File Manager");
    ui.weak("Scan and import .h5ad files from the server.");

    let scan_label = if state.is_scanning {
        "Scanning..."
    } else {
        "Scan Files"
    };
    if ui
        .add_enabled(!state.is_scanning, egui::Button::new(scan_label))
        .clicked()
    {
        state.is_scanning = true;
        state.file_error = None;
        state.scan_promise = Some(api::scan_files_promise());
    }

    if let Some(err) = &state.file_error {
        ui.colored_label(Color32::RED, err.clone());
    }

    ui.separator();

    let mut import_request: Option<usize> = None;
    for i in 0..state.files.len() {
        let assigned = state.files[i].dataset_name.trim().to_string();
        let job = state
            .poller
            .job(&assigned)
            .map(|job| (job.status, job.summary.clone(), job.error.clone()));
        let is_active = matches!(&job, Some((status, _, _)) if status.is_active());

        ui.horizontal(|ui| {
            ui.label(&state.files[i].filename);
            ui.add_enabled(
                !is_active,
                egui::TextEdit::singleline(&mut state.files[i].dataset_name)
                    .hint_text("Dataset name")
                    .desired_width(200.0),
            );

            match job {
                None | Some((ProcessingStatus::Pending, _, _)) => {
                    if ui
                        .add_enabled(!assigned.is_empty(), egui::Button::new("Import"))
                        .clicked()
                    {
                        import_request = Some(i);
                    }
                }
                Some((ProcessingStatus::Starting, _, _)) => {
                    ui.add_enabled(false, egui::Button::new("Starting..."));
                }
                Some((ProcessingStatus::Importing, summary, _)) => {
                    let progress = summary
                        .as_ref()
                        .filter(|s| s.dataset_info.n_cells > 0)
                        .map(|s| {
                            format!(
                                " ({} / {})",
                                s.dataset_info.imported_cells.unwrap_or(0),
                                s.dataset_info.n_cells
                            )
                        })
                        .unwrap_or_default();
                    ui.add_enabled(false, egui::Button::new(format!("Importing...{progress}")));
                }
                Some((ProcessingStatus::Completed, _, _)) => {
                    ui.add_enabled(false, egui::Button::new("Completed"));
                }
                Some((ProcessingStatus::Failed, _, error)) => {
                    let mut response = ui.button("Failed. Retry?");
                    if let Some(err) = error {
                        response = response.on_hover_text(err);
                    }
                    if response.clicked() {
                        import_request = Some(i);
                    }
                }
            }
        });
    }

    if let Some(i) = import_request {
        let entry = state.files[i].clone();
        if let Some((name, filename, promise)) = imports::request_import(&entry, &mut state.poller)
        {
            update_debug_panel(state, &format!("import requested: {} as {}", entry.path, name));
            state.import_promises.push((name, filename, promise));
        }
    }
}

pub fn datasets_tab(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        ui.heading("Manage Datasets");
        if ui.button("Refresh").clicked() {
            state.datasets_dirty = true;
        }
    });

    if state.is_fetching_datasets {
        ui.label("Loading datasets...");
        return;
    }
    if let Some(err) = &state.datasets_error {
        ui.colored_label(Color32::RED, err.clone());
        return;
    }
    if state.datasets.is_empty() {
        ui.label("No datasets found.");
        return;
    }

    if let Some(err) = &state.delete_error {
        ui.colored_label(Color32::RED, err.clone());
    }
    if state.delete_promise.is_some() {
        ui.label("Deleting...");
    }

    let mut request_delete: Option<String> = None;
    {
        let datasets = &state.datasets;
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::remainder())
            .header(20.0, |mut header| {
                for title in ["Name", "Cells", "Genes", "Status", ""] {
                    header.col(|ui| {
                        ui.label(title);
                    });
                }
            })
            .body(|body| {
                body.rows(18.0, datasets.len(), |mut row| {
                    let dataset = &datasets[row.index()];
                    row.col(|ui| {
                        ui.label(&dataset.name);
                    });
                    row.col(|ui| {
                        ui.label(dataset.n_cells.to_string());
                    });
                    row.col(|ui| {
                        ui.label(dataset.n_genes.to_string());
                    });
                    row.col(|ui| {
                        ui.label(
                            dataset
                                .processing_status
                                .map(|status| status.label())
                                .unwrap_or("-"),
                        );
                    });
                    row.col(|ui| {
                        if ui.button("Delete").clicked() {
                            request_delete = Some(dataset.name.clone());
                        }
                    });
                });
            });
    }
    if let Some(name) = request_delete {
        state.pending_delete = Some(name);
    }

    if let Some(name) = state.pending_delete.clone() {
        egui::Window::new("Confirm Deletion")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ui.ctx(), |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(format!(
                        "Are you sure you want to delete the dataset \"{name}\"?\nThis action cannot be undone."
                    ));
                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui.button("Yes, Delete").clicked() {
                            state.delete_promise =
                                Some((name.clone(), api::delete_dataset_promise(name.clone())));
                            state.pending_delete = None;
                        }
                        if ui.button("Cancel").clicked() {
                            state.pending_delete = None;
                        }
                    });
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellData;

    fn cells(n: usize) -> Vec<CellData> {
        (0..n)
            .map(|i| CellData {
                cell_barcode: format!("AAACCT{i}"),
                umap_1: i as f64,
                umap_2: -(i as f64),
                cluster_id: Some(format!("{}", i % 2)),
                cell_type: None,
            })
            .collect()
    }

    fn umap_response(n: usize) -> UmapResponse {
        UmapResponse {
            cells: cells(n),
            total_cells: Some(n as i64),
            query_duration_ms: Some(12),
        }
    }

    #[test]
    fn test_stale_umap_response_is_ignored() {
        let mut state = AppState::default();
        state.selected_dataset = Some("b".to_string());
        state.dataset_generation = 2;

        // A response from the previous selection (generation 1).
        apply_umap_result(&mut state, 1, Ok((umap_response(4), 40)));
        assert!(state.cells.is_empty());
        assert!(state.base_trace.is_none());

        apply_umap_result(&mut state, 2, Ok((umap_response(4), 40)));
        assert_eq!(state.cells.len(), 4);
        assert!(state.base_trace.is_some());
        assert_eq!(state.query_ms, Some(12));
        assert_eq!(state.network_ms, Some(28));
    }

    #[test]
    fn test_failed_expression_fetch_keeps_categorical_trace() {
        let mut state = AppState::default();
        state.selected_dataset = Some("a".to_string());
        apply_umap_result(&mut state, 0, Ok((umap_response(3), 20)));
        let base = state.base_trace.clone().unwrap();

        apply_expression_result(
            &mut state,
            0,
            "NOTAGENE",
            Err(ApiError::NotFound("no such gene".to_string())),
        );
        assert!(state.overlay_trace.is_none());
        assert_eq!(state.base_trace.as_ref(), Some(&base));
        assert_eq!(
            state.expression_error.as_deref(),
            Some("Gene 'NOTAGENE' not found or error fetching data.")
        );
    }

    #[test]
    fn test_mismatched_expression_overlay_reports_and_keeps_base() {
        let mut state = AppState::default();
        state.selected_dataset = Some("a".to_string());
        apply_umap_result(&mut state, 0, Ok((umap_response(3), 20)));

        apply_expression_result(
            &mut state,
            0,
            "CD3D",
            Ok(ExpressionResponse {
                values: vec![1.0],
                gene_symbol: Some("CD3D".to_string()),
            }),
        );
        assert!(state.overlay_trace.is_none());
        assert!(state.base_trace.is_some());
        assert!(state.expression_error.is_some());
    }

    #[test]
    fn test_successful_expression_overlay_switches_trace() {
        let mut state = AppState::default();
        state.selected_dataset = Some("a".to_string());
        apply_umap_result(&mut state, 0, Ok((umap_response(3), 20)));

        apply_expression_result(
            &mut state,
            0,
            "CD3D",
            Ok(ExpressionResponse {
                values: vec![0.0, 1.5, 3.0],
                gene_symbol: Some("CD3D".to_string()),
            }),
        );
        assert!(state.overlay_trace.is_some());
        assert!(state.expression_error.is_none());
        // The base trace stays recoverable for the Clear action.
        assert!(state.base_trace.is_some());
    }

    #[test]
    fn test_group_markers_preserves_ranked_order() {
        let gene = |cluster: &str, symbol: &str| MarkerGene {
            cluster_id: cluster.to_string(),
            gene_symbol: symbol.to_string(),
            log2_fold_change: Some(1.0),
        };
        let groups = group_markers(vec![
            gene("0", "CD3D"),
            gene("1", "LYZ"),
            gene("0", "CD3E"),
            gene("1", "S100A8"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "0");
        let symbols: Vec<&str> = groups[0].1.iter().map(|g| g.gene_symbol.as_str()).collect();
        assert_eq!(symbols, vec!["CD3D", "CD3E"]);
        assert_eq!(groups[1].0, "1");
    }
}
