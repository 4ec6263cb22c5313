//! Source-level overrides applied to every fetched desired job.

use mooring_core::types::{DesiredState, Source};

/// Replace datacenters and namespace on every job when the source overrides them.
///
/// The datacenter override is comma-separated; entries are trimmed and
/// empty entries dropped.
pub fn apply_overrides(source: &Source, desired: &mut DesiredState) {
    let datacenters: Vec<String> = source
        .data_center
        .split(',')
        .map(str::trim)
        .filter(|dc| !dc.is_empty())
        .map(str::to_owned)
        .collect();

    for info in desired.jobs.values_mut() {
        if !datacenters.is_empty() {
            info.job.datacenters = datacenters.clone();
        }
        if !source.namespace.is_empty() {
            info.job.namespace = Some(source.namespace.clone());
        }
    }
}

/// Attach a resolved vault token to every desired job.
pub fn inject_vault_token(desired: &mut DesiredState, token: &str) {
    for info in desired.jobs.values_mut() {
        info.job.vault_token = Some(token.to_owned());
    }
}
