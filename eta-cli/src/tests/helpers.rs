//! Test helpers for composing configuration layers and request files.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use eta_core::{EstimatorConfig, SpeedCacheConfig};
use eta_data::SpeedTableLocation;
use ortho_config::MergeComposer;
use serde_json::Value;
use tempfile::TempDir;

use super::*;
use crate::config::{EngineSettings, ServeConfig};

/// Drop `null` entries so absent CLI flags do not mask lower layers.
pub(super) fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, entry)| !entry.is_null())
                .collect(),
        ),
        other => other,
    }
}

/// Merge file, environment and CLI layers for `serve`, in that order of
/// increasing precedence.
pub(super) fn merge_serve_layers(
    args: ServeArgs,
    file_layer: Option<Value>,
    env_layer: Option<Value>,
    legacy_env: &dyn Fn(&str) -> Option<String>,
) -> Result<ServeConfig, CliError> {
    let mut composer = MergeComposer::new();
    if let Some(file) = file_layer {
        composer.push_file(file, None);
    }
    if let Some(env) = env_layer {
        composer.push_environment(env);
    }
    let cli = serde_json::to_value(&args).expect("serialise CLI arguments");
    composer.push_cli(without_nulls(cli));
    let merged = ServeArgs::merge_from_layers(composer.layers()).map_err(CliError::from)?;
    ServeConfig::resolve(merged, legacy_env)
}

/// Engine settings suitable for running the estimate command in tests.
pub(super) fn engine_settings() -> EngineSettings {
    EngineSettings {
        speed_table: SpeedTableLocation::File("unused.csv".into()),
        request_timeout: Duration::from_secs(3),
        estimator: EstimatorConfig::default(),
        cache: SpeedCacheConfig::default(),
    }
}

/// A temporary directory holding request files.
pub(super) struct RequestFiles {
    dir: TempDir,
}

impl RequestFiles {
    pub(super) fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        Utf8Path::from_path(self.dir.path()).expect("utf-8 tempdir")
    }

    pub(super) fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root().join(name);
        std::fs::write(&path, contents).expect("write request file");
        path
    }
}
