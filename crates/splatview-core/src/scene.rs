//! Scene file loading with fallback
//!
//! The splat file may be published in more than one format. Candidates are
//! tried strictly in order and the first one that loads wins.

use std::fmt::Display;
use std::future::Future;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneLoadError {
    #[error("No scene files configured")]
    NoCandidates,
    #[error("Could not load the scene from {}", describe_attempts(.0))]
    Exhausted(Vec<(String, String)>),
}

fn describe_attempts(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(url, e)| format!("{url} ({e})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A scene payload together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedScene<S> {
    pub url: String,
    pub scene: S,
}

/// Try `load` on each candidate until one succeeds.
pub async fn load_first<S, E, F, Fut>(
    candidates: &[String],
    mut load: F,
) -> Result<LoadedScene<S>, SceneLoadError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<S, E>>,
    E: Display,
{
    if candidates.is_empty() {
        return Err(SceneLoadError::NoCandidates);
    }

    let mut attempts = Vec::with_capacity(candidates.len());
    for url in candidates {
        match load(url.clone()).await {
            Ok(scene) => {
                info!(%url, "Scene loaded");
                return Ok(LoadedScene {
                    url: url.clone(),
                    scene,
                });
            }
            Err(e) => {
                warn!(%url, error = %e, "Scene candidate failed");
                attempts.push((url.clone(), e.to_string()));
            }
        }
    }
    Err(SceneLoadError::Exhausted(attempts))
}
