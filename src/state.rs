//! Application state: prompt configuration, the optional gateway client,
//! and the flat-file store.
//!
//! Everything here is constructed once at process start and shared across
//! handlers. Pipelines re-read persisted documents from the store on every
//! call; nothing is cached in memory.

use tracing::{error, info, instrument};

use crate::config::{load_prompt_config_from_env, PromptConfig};
use crate::openrouter::OpenRouter;
use crate::store::FileStore;

#[derive(Clone)]
pub struct AppState {
  pub prompts: PromptConfig,
  pub gateway: Option<OpenRouter>,
  pub store: FileStore,
}

impl AppState {
  /// Build state from env: load prompt config, bootstrap the data root,
  /// init the gateway client.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    // TOML overrides if provided, compiled-in defaults otherwise.
    let prompts = load_prompt_config_from_env().unwrap_or_default();

    let data_root = std::env::var("DATA_DIR").unwrap_or_else(|_| ".".into());
    let store = FileStore::new(&data_root);
    if let Err(e) = store.bootstrap() {
      error!(target: "worksheetforge_backend", error = %e, %data_root, "Could not create data directories");
    }

    // Build optional gateway client (if API key present).
    let gateway = OpenRouter::from_env();
    if let Some(gw) = &gateway {
      info!(
        target: "worksheetforge_backend",
        base_url = %gw.base_url,
        text_model = %gw.text_model,
        vision_model = %gw.vision_model,
        "OpenRouter enabled."
      );
    } else {
      info!(target: "worksheetforge_backend", "OpenRouter disabled (no OPENROUTER_API_KEY). LLM endpoints will report 503.");
    }

    Self { prompts, gateway, store }
  }
}
