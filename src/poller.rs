//! Remote folder snapshots and new-upload detection.

use std::collections::HashSet;

use crate::drive::{RemoteFileRecord, RemoteListing};

/// Takes snapshots of one remote folder, absorbing API failures.
pub struct Poller<L> {
    listing: L,
    folder_id: String,
}

impl<L: RemoteListing> Poller<L> {
    pub fn new(listing: L, folder_id: impl Into<String>) -> Self {
        Self {
            listing,
            folder_id: folder_id.into(),
        }
    }

    /// Current listing, most recently modified first. Empty when the call fails.
    pub fn snapshot(&self) -> Vec<RemoteFileRecord> {
        match self.listing.list_folder(&self.folder_id) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!("An error occurred: {err}");
                Vec::new()
            }
        }
    }
}

/// First record of `current` that is absent from `initial`, provided the folder grew.
///
/// Only a count increase is considered: a delete followed by an upload, which
/// leaves the count unchanged, goes unnoticed, as do deletions.
pub fn detect_new_file<'a>(
    initial: &[RemoteFileRecord],
    current: &'a [RemoteFileRecord],
) -> Option<&'a RemoteFileRecord> {
    if current.len() <= initial.len() {
        return None;
    }
    let known: HashSet<&str> = initial.iter().map(|file| file.id.as_str()).collect();
    current.iter().find(|file| !known.contains(file.id.as_str()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::RemoteError;

    fn records(ids: &[&str]) -> Vec<RemoteFileRecord> {
        ids.iter()
            .map(|id| RemoteFileRecord {
                id: id.to_string(),
                name: format!("file-{id}.jpg"),
            })
            .collect()
    }

    struct Scripted(Mutex<Vec<Result<Vec<RemoteFileRecord>, RemoteError>>>);

    impl RemoteListing for Scripted {
        fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFileRecord>, RemoteError> {
            assert_eq!(folder_id, "folder");
            self.0.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn reports_the_added_record() {
        let initial = records(&["1", "2"]);
        let current = records(&["1", "2", "3"]);
        assert_eq!(detect_new_file(&initial, &current).map(|f| f.id.as_str()), Some("3"));
    }

    #[test]
    fn first_new_record_in_snapshot_order_wins() {
        let initial = records(&["1"]);
        let current = records(&["5", "4", "1"]);
        assert_eq!(detect_new_file(&initial, &current).map(|f| f.id.as_str()), Some("5"));
    }

    #[test]
    fn replacement_in_place_goes_unnoticed() {
        let initial = records(&["1", "2"]);
        let current = records(&["1", "3"]);
        assert_eq!(detect_new_file(&initial, &current), None);
    }

    #[test]
    fn shrinking_or_unchanged_folders_report_nothing() {
        let initial = records(&["1", "2"]);
        assert_eq!(detect_new_file(&initial, &records(&["1"])), None);
        assert_eq!(detect_new_file(&initial, &records(&["1", "2"])), None);
    }

    #[test]
    fn growth_without_unknown_ids_reports_nothing() {
        let initial = records(&["1", "2"]);
        let current = records(&["1", "2", "2"]);
        assert_eq!(detect_new_file(&initial, &current), None);
    }

    #[test]
    fn snapshot_swallows_errors() {
        let poller = Poller::new(
            Scripted(Mutex::new(vec![
                Err(RemoteError::Status {
                    status: 500,
                    body: "boom".into(),
                }),
                Ok(records(&["1"])),
            ])),
            "folder",
        );
        assert!(poller.snapshot().is_empty());
        assert_eq!(poller.snapshot(), records(&["1"]));
    }
}
