use crate::api::{self, ApiError};
use crate::models::ImportResponse;
use crate::poller::ImportPoller;
use poll_promise::Promise;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: String,
    pub path: String,
    pub dataset_name: String,
}

// "processed_pbmc3k.h5ad" scans in as dataset "pbmc3k".
pub fn default_dataset_name(filename: &str) -> String {
    let name = filename.strip_suffix(".h5ad").unwrap_or(filename);
    let name = name.strip_prefix("processed_").unwrap_or(name);
    name.to_string()
}

pub fn apply_scan(files: Vec<String>, directory: &str) -> Vec<FileEntry> {
    files
        .into_iter()
        .map(|filename| {
            let dataset_name = default_dataset_name(&filename);
            let path = format!("{}/{}", directory.trim_end_matches('/'), filename);
            FileEntry {
                filename,
                path,
                dataset_name,
            }
        })
        .collect()
}

// Starts the import workflow for one scanned file. An empty assigned name
// is a local validation failure: nothing is sent and no job is tracked.
pub fn request_import(
    entry: &FileEntry,
    poller: &mut ImportPoller,
) -> Option<(String, String, Promise<Result<ImportResponse, ApiError>>)> {
    let dataset_name = entry.dataset_name.trim();
    if dataset_name.is_empty() {
        return None;
    }
    poller.mark_starting(dataset_name);
    let promise = api::import_file_promise(entry.path.clone(), dataset_name.to_string());
    Some((dataset_name.to_string(), entry.filename.clone(), promise))
}

// Applies the result of the import request itself. Success hands the job
// to the poller; failure surfaces a message and leaves a manual retry.
pub fn finish_import(
    dataset_name: &str,
    filename: &str,
    result: Result<ImportResponse, ApiError>,
    poller: &mut ImportPoller,
) -> Option<String> {
    match result {
        Ok(_) => {
            poller.watch(dataset_name);
            None
        }
        Err(err) => {
            poller.mark_failed(dataset_name, &err.to_string());
            Some(format!("Failed to start import for {filename}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessingStatus;
    use crate::poller::StatusFetch;
    use crate::models::DatasetSummary;
    use std::sync::Arc;

    struct NeverFetch;

    impl StatusFetch for NeverFetch {
        fn fetch(&self, dataset_name: &str) -> Result<DatasetSummary, ApiError> {
            Err(ApiError::NotFound(dataset_name.to_string()))
        }
    }

    fn test_poller() -> ImportPoller {
        ImportPoller::new(Arc::new(NeverFetch))
    }

    #[test]
    fn test_default_dataset_name_strips_suffix_and_prefix() {
        assert_eq!(default_dataset_name("processed_sample.h5ad"), "sample");
        assert_eq!(default_dataset_name("sample.h5ad"), "sample");
        assert_eq!(default_dataset_name("pbmc3k"), "pbmc3k");
        assert_eq!(default_dataset_name("processed_only"), "only");
    }

    #[test]
    fn test_apply_scan_builds_paths_and_names() {
        let entries = apply_scan(vec!["sample.h5ad".to_string()], "/data/h5ad");
        assert_eq!(
            entries,
            vec![FileEntry {
                filename: "sample.h5ad".to_string(),
                path: "/data/h5ad/sample.h5ad".to_string(),
                dataset_name: "sample".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_assigned_name_is_a_no_op() {
        let mut poller = test_poller();
        let entry = FileEntry {
            filename: "sample.h5ad".to_string(),
            path: "/data/h5ad/sample.h5ad".to_string(),
            dataset_name: "  ".to_string(),
        };
        assert!(request_import(&entry, &mut poller).is_none());
        assert!(poller.job("sample").is_none());
        assert!(!poller.has_active());
    }

    #[test]
    fn test_request_failure_marks_job_failed_with_message() {
        let mut poller = test_poller();
        poller.mark_starting("sample");
        let message = finish_import(
            "sample",
            "sample.h5ad",
            Err(ApiError::Server {
                status: 400,
                detail: "bad h5ad".to_string(),
            }),
            &mut poller,
        );
        assert!(message.as_deref().unwrap().contains("sample.h5ad"));
        assert!(message.as_deref().unwrap().contains("bad h5ad"));
        assert_eq!(
            poller.job("sample").unwrap().status,
            ProcessingStatus::Failed
        );
    }

    #[test]
    fn test_request_success_hands_the_job_to_the_poller() {
        let mut poller = test_poller();
        poller.mark_starting("sample");
        let message = finish_import(
            "sample",
            "sample.h5ad",
            Ok(ImportResponse {
                success: Some(true),
                message: None,
            }),
            &mut poller,
        );
        assert!(message.is_none());
        assert_eq!(
            poller.job("sample").unwrap().status,
            ProcessingStatus::Importing
        );
        assert!(poller.has_active());
    }
}
