//! Remediation mutators: pure structural edits over decoded manifests.
//!
//! Horizontal scaling moves the replica count by one; vertical scaling moves
//! the first container's CPU/memory requests by a fixed step. Neither touches
//! the remote API.

use crate::jobs::manifests::DecodedManifest;
use crate::jobs::types::{RemediationType, Result};
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::warn;

/// Vertical step: 1000 millicores
const CPU_STEP_MILLIS: i64 = 1000;
/// Vertical step: 1000 MiB
const MEMORY_STEP_BYTES: i64 = 1000 * 1024 * 1024;

const MEBIBYTE: i64 = 1024 * 1024;
const GIBIBYTE: i64 = 1024 * 1024 * 1024;

/// Apply the mutator matching `sub_type` to one decoded manifest. Returns
/// true when the manifest was changed; manifests of kinds the mutator does
/// not understand pass through untouched.
pub fn apply(decoded: &mut DecodedManifest, sub_type: RemediationType) -> Result<bool> {
    let changed = match sub_type {
        RemediationType::ScaleUp => scale_replicas(decoded, 1),
        RemediationType::ScaleDown => scale_replicas(decoded, -1),
        RemediationType::ScaleOut => scale_requests(decoded, 1),
        RemediationType::ScaleIn => scale_requests(decoded, -1),
        _ => false,
    };
    Ok(changed)
}

/// Move the replica count by `delta`, clamped at zero. A decrement that
/// would go below zero leaves the count at zero.
fn scale_replicas(decoded: &mut DecodedManifest, delta: i32) -> bool {
    match decoded {
        DecodedManifest::Deployment(deployment) => {
            let Some(spec) = deployment.spec.as_mut() else {
                return false;
            };
            let replicas = spec.replicas.unwrap_or(1);
            spec.replicas = Some((replicas + delta).max(0));
            true
        }
        DecodedManifest::StatefulSet(statefulset) => {
            let Some(spec) = statefulset.spec.as_mut() else {
                return false;
            };
            let replicas = spec.replicas.unwrap_or(1);
            spec.replicas = Some((replicas + delta).max(0));
            true
        }
        _ => false,
    }
}

/// Move the first container's CPU and memory requests by one step in the
/// given direction. An adjustment that would drive a request negative is
/// discarded, leaving the prior value.
fn scale_requests(decoded: &mut DecodedManifest, direction: i64) -> bool {
    let DecodedManifest::Deployment(deployment) = decoded else {
        return false;
    };
    let Some(container) = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod| pod.containers.first_mut())
    else {
        return false;
    };

    let resources = container
        .resources
        .get_or_insert_with(ResourceRequirements::default);
    let requests = resources.requests.get_or_insert_with(BTreeMap::new);

    adjust_request(requests, "cpu", direction * CPU_STEP_MILLIS, adjust_cpu);
    adjust_request(
        requests,
        "memory",
        direction * MEMORY_STEP_BYTES,
        adjust_memory,
    );
    true
}

fn adjust_request(
    requests: &mut BTreeMap<String, Quantity>,
    key: &str,
    delta: i64,
    adjust: fn(&Quantity, i64) -> Option<Quantity>,
) {
    let current = requests
        .get(key)
        .cloned()
        .unwrap_or_else(|| Quantity("0".to_string()));
    match adjust(&current, delta) {
        Some(next) => {
            requests.insert(key.to_string(), next);
        }
        None => {
            warn!(
                "skipping {key} adjustment of {:?}: unparseable quantity or negative result",
                current.0
            );
        }
    }
}

/// Add `delta` millicores to a CPU quantity; None when the result is negative.
fn adjust_cpu(quantity: &Quantity, delta: i64) -> Option<Quantity> {
    let millis = parse_cpu_millis(&quantity.0)? + delta;
    if millis < 0 {
        return None;
    }
    if millis % 1000 == 0 {
        Some(Quantity((millis / 1000).to_string()))
    } else {
        Some(Quantity(format!("{millis}m")))
    }
}

/// Add `delta` bytes to a memory quantity; None when the result is negative.
fn adjust_memory(quantity: &Quantity, delta: i64) -> Option<Quantity> {
    let bytes = parse_memory_bytes(&quantity.0)? + delta;
    if bytes < 0 {
        return None;
    }
    if bytes > 0 && bytes % GIBIBYTE == 0 {
        Some(Quantity(format!("{}Gi", bytes / GIBIBYTE)))
    } else if bytes > 0 && bytes % MEBIBYTE == 0 {
        Some(Quantity(format!("{}Mi", bytes / MEBIBYTE)))
    } else {
        Some(Quantity(bytes.to_string()))
    }
}

fn parse_cpu_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(nanos) = raw.strip_suffix('n') {
        return nanos.parse::<f64>().ok().map(|n| (n / 1_000_000.0) as i64);
    }
    if let Some(micros) = raw.strip_suffix('u') {
        return micros.parse::<f64>().ok().map(|u| (u / 1_000.0) as i64);
    }
    if let Some(millis) = raw.strip_suffix('m') {
        return millis.parse::<f64>().ok().map(|m| m as i64);
    }
    // Plain cores, including fractional and exponent spellings ("1.5", "1e2")
    raw.parse::<f64>().ok().map(|cores| (cores * 1000.0) as i64)
}

fn parse_memory_bytes(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    const SUFFIXES: &[(&str, i64)] = &[
        ("Ki", 1024),
        ("Mi", MEBIBYTE),
        ("Gi", GIBIBYTE),
        ("Ti", 1024 * GIBIBYTE),
        ("Pi", 1024 * 1024 * GIBIBYTE),
        ("k", 1000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
    ];
    // Binary suffixes are checked first so "Mi" never matches the "M" arm
    for (suffix, factor) in SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return number
                .parse::<f64>()
                .ok()
                .map(|n| (n * (*factor as f64)) as i64);
        }
    }
    raw.parse::<f64>().ok().map(|bytes| bytes as i64)
}
