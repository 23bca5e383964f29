// ── Result aggregation ───────────────────────────────────────────────────────

use crate::sftp::types::{BatchResult, SingleTransferResult};
use filerelay_core::OperationLog;
use std::collections::BTreeMap;

/// Fold per-file outcomes into the batch result. Skipped items count as
/// successful for `success` but are excluded from the counters.
pub fn aggregate(results: &[SingleTransferResult], log: &OperationLog) -> BatchResult {
    let success = results.iter().all(|r| r.success);
    let action_skipped = success && !results.is_empty() && results.iter().all(|r| r.action_skipped);

    let mut transfer_errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut transferred_file_names = Vec::new();
    let mut transferred_file_paths = Vec::new();
    let mut transferred_destination_file_paths = Vec::new();
    let mut failed_transfer_count = 0;

    for r in results {
        if !r.success {
            failed_transfer_count += 1;
            transfer_errors
                .entry(r.file_name.clone())
                .or_default()
                .extend(r.error_list.iter().cloned());
            continue;
        }
        if r.action_skipped {
            continue;
        }
        transferred_file_names.extend(r.transferred_file.clone());
        transferred_file_paths.extend(r.transferred_file_path.clone());
        transferred_destination_file_paths.extend(r.transferred_destination_path.clone());
    }

    let user_result_message = if action_skipped {
        let notes: Vec<&str> = results
            .iter()
            .flat_map(|r| r.warnings.iter().map(String::as_str))
            .collect();
        if notes.is_empty() {
            "No files transferred.".to_string()
        } else {
            notes.join("\n")
        }
    } else {
        summary(&transfer_errors, &transferred_file_names)
    };

    BatchResult {
        success,
        action_skipped,
        user_result_message,
        successful_transfer_count: transferred_file_names.len(),
        failed_transfer_count,
        transferred_file_names,
        transfer_errors,
        transferred_file_paths,
        transferred_destination_file_paths,
        operations_log: log.lines(),
    }
}

/// `"<n> Errors: <details>.\n<m> files transferred: <names>"`
fn summary(errors: &BTreeMap<String, Vec<String>>, transferred: &[String]) -> String {
    let mut msg = String::new();
    let details: Vec<&str> = errors
        .values()
        .flatten()
        .map(|m| m.trim_end_matches('.'))
        .collect();
    if !details.is_empty() {
        msg.push_str(&format!("{} Errors: {}.\n", details.len(), details.join(".\n")));
    }
    if transferred.is_empty() {
        msg.push_str("No files transferred.");
    } else {
        msg.push_str(&format!(
            "{} files transferred: {}",
            transferred.len(),
            transferred.join(", ")
        ));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(name: &str) -> SingleTransferResult {
        SingleTransferResult {
            file_name: name.into(),
            success: true,
            transferred_file: Some(name.into()),
            transferred_file_path: Some(format!("/out/{}", name)),
            transferred_destination_path: Some(format!("/in/{}", name)),
            ..Default::default()
        }
    }

    fn failed(name: &str, msg: &str) -> SingleTransferResult {
        SingleTransferResult {
            file_name: name.into(),
            success: false,
            error_list: vec![msg.into()],
            ..Default::default()
        }
    }

    fn skipped(note: &str) -> SingleTransferResult {
        SingleTransferResult {
            success: true,
            action_skipped: true,
            warnings: vec![note.into()],
            ..Default::default()
        }
    }

    #[test]
    fn all_success() {
        let log = OperationLog::new(10);
        log.push("Transferred a");
        let r = aggregate(&[ok("a.txt"), ok("b.txt")], &log);
        assert!(r.success);
        assert!(!r.action_skipped);
        assert_eq!(r.successful_transfer_count, 2);
        assert_eq!(r.failed_transfer_count, 0);
        assert_eq!(r.transferred_file_names, vec!["a.txt", "b.txt"]);
        assert_eq!(r.transferred_destination_file_paths, vec!["/in/a.txt", "/in/b.txt"]);
        assert_eq!(r.user_result_message, "2 files transferred: a.txt, b.txt");
        assert_eq!(r.operations_log.len(), 1);
    }

    #[test]
    fn mixed_results_group_errors_by_file() {
        let r = aggregate(
            &[ok("a.txt"), failed("b.txt", "Failure in PutFile: boom."), failed("b.txt", "again")],
            &OperationLog::disabled(),
        );
        assert!(!r.success);
        assert_eq!(r.failed_transfer_count, 2);
        assert_eq!(r.successful_transfer_count, 1);
        assert_eq!(r.transfer_errors["b.txt"].len(), 2);
        assert_eq!(
            r.user_result_message,
            "2 Errors: Failure in PutFile: boom.\nagain.\n1 files transferred: a.txt"
        );
    }

    #[test]
    fn nothing_transferred() {
        let r = aggregate(&[failed("a.txt", "x")], &OperationLog::disabled());
        assert!(r.user_result_message.ends_with("No files transferred."));
        assert!(r.transferred_file_names.is_empty());
    }

    #[test]
    fn skipped_only() {
        let r = aggregate(&[skipped("No source files found")], &OperationLog::disabled());
        assert!(r.success);
        assert!(r.action_skipped);
        assert_eq!(r.successful_transfer_count, 0);
        assert_eq!(r.failed_transfer_count, 0);
        assert_eq!(r.user_result_message, "No source files found");
    }

    #[test]
    fn skipped_does_not_mask_failure() {
        let r = aggregate(&[skipped("x"), failed("a", "y")], &OperationLog::disabled());
        assert!(!r.success);
        assert!(!r.action_skipped);
    }
}
