//! Bootstrap and recovery of the job's version state.

use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};

use super::{
    edit::VersionEdit, log, manifest_file_name, Version, VersionError, CURRENT_FILE, MAX_LEVEL,
};
use crate::{
    observability::log_info,
    protocol::{CompactionRequest, FileMeta},
};

/// The job's on-disk version history and its recovered current version.
#[derive(Debug)]
pub struct VersionSet {
    dir: PathBuf,
    current: Version,
}

impl VersionSet {
    /// Build the minimal metadata state for one job, then recover it back.
    ///
    /// Any failure is fatal to the job and never retried: the state is
    /// synthetic, so a rejection means the request and engine are
    /// incompatible, not that something transient went wrong.
    pub async fn bootstrap(
        output_dir: &str,
        request: &CompactionRequest,
    ) -> Result<Self, VersionError> {
        let dir = PathBuf::from(output_dir);
        fs::create_dir_all(&dir).await?;

        let edits = seed_edits(request);
        let mut payload = Vec::new();
        for edit in &edits {
            edit.encode_into(&mut payload);
        }

        let manifest_name = manifest_file_name(request.version_state.manifest_file_number);
        let mut writer = log::Writer::create(&dir.join(&manifest_name)).await?;
        writer.append(&payload).await?;
        // Log durability precedes the pointer write.
        writer.sync().await?;
        set_current(&dir, &manifest_name).await?;

        let set = Self::recover(&dir).await?;
        if set.current.cf_id != request.cf_id || set.current.cf_name != request.cf_name {
            return Err(VersionError::Corrupt(
                "recovered column family does not match request",
            ));
        }
        log_info!(
            event = "version_bootstrapped",
            cf = %set.current.cf_name,
            files = set.current.file_count(),
            manifest = %manifest_name,
        );
        Ok(set)
    }

    /// Standard recovery: resolve the current pointer, replay the log.
    pub async fn recover(dir: &Path) -> Result<Self, VersionError> {
        let pointer = fs::read_to_string(dir.join(CURRENT_FILE)).await?;
        let manifest_name = pointer.trim_end();
        if manifest_name.is_empty() {
            return Err(VersionError::Corrupt("current pointer is empty"));
        }

        let mut reader = log::Reader::open(&dir.join(manifest_name)).await?;
        let mut edits = Vec::new();
        while let Some(payload) = reader.next_record()? {
            edits.extend(VersionEdit::decode_batch(payload)?);
        }
        let current = apply_edits(edits)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            current,
        })
    }

    /// The recovered storage-state view.
    pub fn current(&self) -> &Version {
        &self.current
    }

    /// Directory holding the metadata log and the job's outputs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Edit batch describing one column family holding exactly the request's
/// input files.
fn seed_edits(request: &CompactionRequest) -> Vec<VersionEdit> {
    let mut edits = vec![
        VersionEdit::NextFileNumber(request.version_state.next_file_number),
        VersionEdit::LastSequence(request.version_state.last_sequence),
        VersionEdit::ColumnFamily {
            id: request.cf_id,
            name: request.cf_name.clone(),
        },
    ];
    for level in &request.inputs {
        for file in &level.files {
            edits.push(VersionEdit::AddFile {
                level: level.level,
                file: file.clone(),
            });
        }
    }
    edits
}

async fn set_current(dir: &Path, manifest_name: &str) -> Result<(), VersionError> {
    let mut file = fs::File::create(dir.join(CURRENT_FILE)).await?;
    file.write_all(format!("{manifest_name}\n").as_bytes())
        .await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

fn apply_edits(edits: Vec<VersionEdit>) -> Result<Version, VersionError> {
    let mut family: Option<(u32, String)> = None;
    let mut next_file_number = 0;
    let mut last_sequence = 0;
    let mut level_slice: [Vec<FileMeta>; MAX_LEVEL] = Default::default();

    for edit in edits {
        match edit {
            VersionEdit::NextFileNumber(number) => next_file_number = number,
            VersionEdit::LastSequence(sequence) => last_sequence = sequence,
            VersionEdit::ColumnFamily { id, name } => {
                if family.is_some() {
                    return Err(VersionError::Corrupt(
                        "more than one column family declared",
                    ));
                }
                family = Some((id, name));
            }
            VersionEdit::AddFile { level, file } => {
                let Some(slot) = level_slice.get_mut(level as usize) else {
                    return Err(VersionError::Corrupt("file level out of range"));
                };
                slot.push(file);
            }
        }
    }

    let Some((cf_id, cf_name)) = family else {
        return Err(VersionError::Corrupt("no column family declared"));
    };
    Ok(Version {
        cf_id,
        cf_name,
        next_file_number,
        last_sequence,
        level_slice,
    })
}
