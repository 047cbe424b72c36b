//! Translation between Secrets and [`Cluster`] records
//!
//! Data layout of a cluster Secret:
//!
//! | key                | value                                |
//! |--------------------|--------------------------------------|
//! | `server`           | connection URI, verbatim             |
//! | `name`             | display name                         |
//! | `config`           | [`ClusterConfig`] as JSON            |
//! | `namespaces`       | comma-joined, omitted when empty     |
//! | `project`          | omitted when empty                   |
//! | `shard`            | decimal integer, omitted when unset  |
//! | `clusterResources` | `"true"`, omitted when false         |
//!
//! The type-marker label and the refresh annotation are owned by the codec
//! and never surface in [`Cluster::labels`] or [`Cluster::annotations`].

use std::collections::BTreeMap;

use armada_common::{
    Error, Result, LAST_APPLIED_CONFIG_ANNOTATION, REFRESH_ANNOTATION_KEY,
    SECRET_TYPE_CLUSTER, SECRET_TYPE_LABEL_KEY,
};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use tracing::warn;

use crate::cluster::{Cluster, ClusterConfig};

const KEY_SERVER: &str = "server";
const KEY_NAME: &str = "name";
const KEY_CONFIG: &str = "config";
const KEY_NAMESPACES: &str = "namespaces";
const KEY_PROJECT: &str = "project";
const KEY_SHARD: &str = "shard";
const KEY_CLUSTER_RESOURCES: &str = "clusterResources";

/// Decode a cluster from its Secret
pub fn secret_to_cluster(secret: &Secret) -> Result<Cluster> {
    let record = secret.name_any();
    let data = secret.data.as_ref();

    let server = required_string(&record, data, KEY_SERVER)?;
    let name = required_string(&record, data, KEY_NAME)?;

    let config = match optional_string(&record, data, KEY_CONFIG)? {
        Some(raw) => serde_json::from_str::<ClusterConfig>(&raw).map_err(|e| {
            Error::invalid_argument_for(
                record.clone(),
                format!("secret {:?} has an invalid config: {}", record, e),
            )
        })?,
        None => ClusterConfig::default(),
    };

    let namespaces = optional_string(&record, data, KEY_NAMESPACES)?
        .map(|raw| split_namespaces(&raw))
        .unwrap_or_default();

    let project = optional_string(&record, data, KEY_PROJECT)?.unwrap_or_default();

    let shard = optional_string(&record, data, KEY_SHARD)?
        .map(|raw| {
            raw.trim().parse::<i64>().map_err(|e| {
                Error::invalid_argument_for(
                    record.clone(),
                    format!("secret {:?} has an invalid shard {:?}: {}", record, raw, e),
                )
            })
        })
        .transpose()?;

    let cluster_resources =
        optional_string(&record, data, KEY_CLUSTER_RESOURCES)?.as_deref() == Some("true");

    let mut labels = secret.labels().clone();
    labels.remove(SECRET_TYPE_LABEL_KEY);

    let mut annotations = secret.annotations().clone();
    annotations.remove(LAST_APPLIED_CONFIG_ANNOTATION);
    let refresh_requested_at = annotations
        .remove(REFRESH_ANNOTATION_KEY)
        .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!(
                    record = %record,
                    value = %raw,
                    error = %e,
                    "Ignoring unparseable refresh annotation"
                );
                None
            }
        });

    Ok(Cluster {
        server,
        name,
        config,
        namespaces,
        project,
        shard,
        cluster_resources,
        labels,
        annotations,
        refresh_requested_at,
        connection_state: Default::default(),
    })
}

/// Encode a cluster into a Secret
///
/// `data`, labels and annotations are replaced wholesale; the rest of the
/// Secret's metadata (name, namespace, resourceVersion) is left alone. Fails
/// without touching `secret` if the cluster carries the reserved annotation.
pub fn cluster_to_secret(cluster: &Cluster, secret: &mut Secret) -> Result<()> {
    validate_cluster(cluster)?;
    let config = serde_json::to_vec(&cluster.config).map_err(|e| {
        Error::invalid_argument_for("config", format!("failed to serialize cluster config: {}", e))
    })?;

    let name = if cluster.name.is_empty() {
        &cluster.server
    } else {
        &cluster.name
    };

    let mut data = BTreeMap::new();
    data.insert(KEY_SERVER.to_string(), bytes(&cluster.server));
    data.insert(KEY_NAME.to_string(), bytes(name));
    data.insert(KEY_CONFIG.to_string(), ByteString(config));
    if !cluster.namespaces.is_empty() {
        data.insert(
            KEY_NAMESPACES.to_string(),
            bytes(&cluster.namespaces.join(",")),
        );
    }
    if !cluster.project.is_empty() {
        data.insert(KEY_PROJECT.to_string(), bytes(&cluster.project));
    }
    if let Some(shard) = cluster.shard {
        data.insert(KEY_SHARD.to_string(), bytes(&shard.to_string()));
    }
    if cluster.cluster_resources {
        data.insert(KEY_CLUSTER_RESOURCES.to_string(), bytes("true"));
    }
    secret.data = Some(data);

    let mut labels = cluster.labels.clone();
    labels.insert(
        SECRET_TYPE_LABEL_KEY.to_string(),
        SECRET_TYPE_CLUSTER.to_string(),
    );
    secret.metadata.labels = Some(labels);

    let mut annotations = cluster.annotations.clone();
    match cluster.refresh_requested_at {
        Some(ts) => {
            annotations.insert(
                REFRESH_ANNOTATION_KEY.to_string(),
                ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        None => {
            annotations.remove(REFRESH_ANNOTATION_KEY);
        }
    }
    secret.metadata.annotations = Some(annotations);

    Ok(())
}

/// Reject clusters that cannot be written
pub fn validate_cluster(cluster: &Cluster) -> Result<()> {
    if cluster.server.is_empty() {
        return Err(Error::invalid_argument_for("server", "cluster server is required"));
    }
    if cluster
        .annotations
        .contains_key(LAST_APPLIED_CONFIG_ANNOTATION)
    {
        return Err(Error::invalid_argument_for(
            LAST_APPLIED_CONFIG_ANNOTATION,
            format!(
                "annotation {} cannot be set on a cluster",
                LAST_APPLIED_CONFIG_ANNOTATION
            ),
        ));
    }
    Ok(())
}

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

fn split_namespaces(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(String::from)
        .collect()
}

fn optional_string(
    record: &str,
    data: Option<&BTreeMap<String, ByteString>>,
    key: &str,
) -> Result<Option<String>> {
    let Some(value) = data.and_then(|d| d.get(key)) else {
        return Ok(None);
    };
    String::from_utf8(value.0.clone()).map(Some).map_err(|_| {
        Error::invalid_argument_for(
            record,
            format!("secret {:?} key {:?} is not valid UTF-8", record, key),
        )
    })
}

fn required_string(
    record: &str,
    data: Option<&BTreeMap<String, ByteString>>,
    key: &str,
) -> Result<String> {
    optional_string(record, data, key)?.ok_or_else(|| {
        Error::invalid_argument_for(
            record,
            format!("secret {:?} is missing required key {:?}", record, key),
        )
    })
}
