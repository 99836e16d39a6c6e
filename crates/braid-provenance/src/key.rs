use braid_workflow::{Job, ProvenanceKey};

use crate::ProvenanceError;

/// Hash a job into its provenance key.
///
/// The digest covers, in order, the JSON encoding of the function name, of the
/// argument map (sorted by slot) and of the version hint when present. Every
/// argument must already be a value.
pub fn prov_key(job: &Job) -> Result<ProvenanceKey, ProvenanceError> {
  let arguments = job.resolved_arguments()?;

  let mut buf = serde_json::to_vec(&job.function)?;
  buf.extend(serde_json::to_vec(&arguments)?);
  if let Some(version) = &job.hints.version {
    buf.extend(serde_json::to_vec(version)?);
  }

  Ok(ProvenanceKey::new(format!("{:x}", md5::compute(&buf))))
}
