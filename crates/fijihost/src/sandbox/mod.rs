//! In-process reference host backed by a Lua sandbox.
//!
//! Keeps an image table and a script editor in memory. Scripts run in a
//! fresh sandboxed Lua state per call and reach host state through the
//! `images.*` and `editor.*` globals.

mod lua;

use async_trait::async_trait;
use fijiconf::HostConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::companion::{Companion, HostLauncher};
use crate::error::HostError;
use crate::script::same_script_title;
use crate::types::{ExecutionOutcome, ImageDescription};

/// An image opened by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxImage {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub slices: u32,
    pub channels: u32,
    pub frames: u32,
}

impl SandboxImage {
    fn describe(&self, active: bool) -> ImageDescription {
        ImageDescription {
            title: self.title.clone(),
            is_the_active_one: active,
            x_size_pix: self.width,
            y_size_pix: self.height,
            z_size_pix: self.slices,
            n_channels: self.channels,
            n_timepoints: self.frames,
            current_active_channel: 1,
            current_active_zslice: 1,
            current_active_timepoint: 1,
        }
    }
}

/// Mutable host state shared between the companion and running scripts.
#[derive(Debug, Default)]
pub struct SandboxState {
    images: Vec<SandboxImage>,
    active: Option<String>,
    editor: Vec<(String, String)>,
}

impl SandboxState {
    /// Open (or reopen) an image and make it active.
    pub fn open_image(&mut self, image: SandboxImage) {
        let title = image.title.clone();
        self.images.retain(|existing| existing.title != title);
        self.images.push(image);
        self.active = Some(title);
    }

    /// Close an image. The most recently opened remaining image becomes active.
    pub fn close_image(&mut self, title: &str) -> bool {
        let before = self.images.len();
        self.images.retain(|image| image.title != title);
        let closed = self.images.len() != before;
        if closed && self.active.as_deref() == Some(title) {
            self.active = self.images.last().map(|image| image.title.clone());
        }
        closed
    }

    pub fn select_image(&mut self, title: &str) -> bool {
        if self.images.iter().any(|image| image.title == title) {
            self.active = Some(title.to_string());
            true
        } else {
            false
        }
    }

    pub fn image_titles(&self) -> Vec<String> {
        self.images.iter().map(|image| image.title.clone()).collect()
    }

    pub fn describe_images(&self) -> Vec<ImageDescription> {
        self.images
            .iter()
            .map(|image| image.describe(self.active.as_deref() == Some(image.title.as_str())))
            .collect()
    }

    /// Create-or-replace an editor buffer.
    pub fn put_script(&mut self, title: &str, code: &str) {
        match self
            .editor
            .iter_mut()
            .find(|(existing, _)| same_script_title(existing, title))
        {
            Some((_, text)) => *text = code.to_string(),
            None => self.editor.push((title.to_string(), code.to_string())),
        }
    }

    pub fn get_script(&self, title: &str) -> Option<String> {
        self.editor
            .iter()
            .find(|(existing, _)| same_script_title(existing, title))
            .map(|(_, text)| text.clone())
    }
}

pub(crate) type SharedState = Arc<Mutex<SandboxState>>;

const BACKSTOP_GRACE: Duration = Duration::from_secs(1);

/// Lock shared state, recovering it if a script panicked while holding it.
pub(crate) fn lock_state(state: &SharedState) -> MutexGuard<'_, SandboxState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Companion for the in-process sandbox.
pub struct SandboxHost {
    state: SharedState,
    timeout: Duration,
    ui_visible: AtomicBool,
}

impl SandboxHost {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SandboxState::default())),
            timeout,
            ui_visible: AtomicBool::new(false),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(30))
    }

    pub fn ui_visible(&self) -> bool {
        self.ui_visible.load(Ordering::SeqCst)
    }

    /// Direct access to host state, for seeding and inspection.
    pub fn state(&self) -> MutexGuard<'_, SandboxState> {
        lock_state(&self.state)
    }
}

#[async_trait]
impl Companion for SandboxHost {
    async fn show_ui(&self) -> Result<(), HostError> {
        self.ui_visible.store(true, Ordering::SeqCst);
        info!("Sandbox UI shown");
        Ok(())
    }

    async fn current_state(&self) -> Result<Vec<ImageDescription>, HostError> {
        Ok(self.state().describe_images())
    }

    async fn execute_script(&self, code: &str) -> Result<ExecutionOutcome, HostError> {
        let code = code.to_string();
        let state = Arc::clone(&self.state);
        let limit = self.timeout;

        // Run Lua in blocking thread pool to avoid blocking the async runtime.
        // The VM stops itself at `limit`; the async timeout only covers time
        // spent outside the interpreter loop.
        let task = tokio::task::spawn_blocking(move || lua::eval_blocking(&code, state, limit));

        match timeout(limit + BACKSTOP_GRACE, task).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(join_error)) => Err(HostError::Sandbox(format!(
                "script task panicked: {}",
                join_error
            ))),
            Err(_) => Ok(ExecutionOutcome::failure(lua::timeout_message(limit))),
        }
    }

    async fn show_or_update_script(&self, code: &str, title: &str) -> Result<(), HostError> {
        debug!(title, "Editor buffer updated");
        self.state().put_script(title, code);
        Ok(())
    }

    async fn script_from_editor(&self, title: &str) -> Result<Option<String>, HostError> {
        Ok(self.state().get_script(title))
    }
}

/// Launcher for [`SandboxHost`].
pub struct SandboxLauncher {
    timeout: Duration,
    show_ui: bool,
}

impl SandboxLauncher {
    pub fn new(timeout: Duration, show_ui: bool) -> Self {
        Self { timeout, show_ui }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(
            Duration::from_millis(config.sandbox.timeout_ms),
            config.show_ui,
        )
    }
}

#[async_trait]
impl HostLauncher for SandboxLauncher {
    async fn launch(&self) -> Result<Arc<dyn Companion>, HostError> {
        let host = SandboxHost::new(self.timeout);
        if self.show_ui {
            host.show_ui().await?;
        }
        Ok(Arc::new(host))
    }

    fn describe(&self) -> String {
        "sandbox".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_state_is_empty_list() {
        let host = SandboxHost::with_defaults();
        assert!(host.current_state().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_return_42() {
        let host = SandboxHost::with_defaults();
        let outcome = host.execute_script("return 42").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::success("integer", json!(42)));
    }

    #[tokio::test]
    async fn test_invalid_syntax_is_failure_not_error() {
        let host = SandboxHost::with_defaults();
        match host.execute_script("invalid syntax !!!").await.unwrap() {
            ExecutionOutcome::Failure { error_message } => {
                assert!(!error_message.is_empty());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_runtime_error_is_failure() {
        let host = SandboxHost::with_defaults();
        let outcome = host.execute_script("error('segmentation failed')").await.unwrap();
        match outcome {
            ExecutionOutcome::Failure { error_message } => {
                assert!(error_message.contains("segmentation failed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_statement_without_return_is_null() {
        let host = SandboxHost::with_defaults();
        let outcome = host.execute_script("local x = 1").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::success("null", json!(null)));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_in_band() {
        let host = SandboxHost::new(Duration::from_millis(100));
        let outcome = host
            .execute_script("local t = os.clock() while os.clock() - t < 1 do end return 1")
            .await
            .unwrap();
        match outcome {
            ExecutionOutcome::Failure { error_message } => {
                assert!(error_message.contains("timed out"));
            }
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timed_out_script_leaves_state_alone() {
        let host = SandboxHost::new(Duration::from_millis(100));
        let outcome = host
            .execute_script(
                "local t = os.clock() while os.clock() - t < 0.5 do end \
                 images.open{ title = 'ghost' } editor.put('ghost', 'x')",
            )
            .await
            .unwrap();
        assert!(!outcome.is_success());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(host.current_state().await.unwrap().is_empty());
        assert_eq!(host.script_from_editor("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_self_referencing_return_is_failure() {
        let host = SandboxHost::with_defaults();
        let outcome = host
            .execute_script("local t = {} t.self = t return t")
            .await
            .unwrap();
        assert!(!outcome.is_success());

        // The host keeps working afterwards
        let outcome = host.execute_script("return 1").await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_scripts_open_images() {
        let host = SandboxHost::with_defaults();
        let outcome = host
            .execute_script(
                r#"
                images.open{title = "blobs.gif", width = 256, height = 254}
                images.open{title = "stack.tif", width = 64, height = 64, slices = 10, channels = 2}
                return images.list()
                "#,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::success("table", json!(["blobs.gif", "stack.tif"]))
        );

        let images = host.current_state().await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].title, "blobs.gif");
        assert!(!images[0].is_the_active_one);
        assert_eq!(images[1].z_size_pix, 10);
        assert_eq!(images[1].n_channels, 2);
        assert!(images[1].is_the_active_one);

        host.execute_script("return images.select('blobs.gif')").await.unwrap();
        let images = host.current_state().await.unwrap();
        assert!(images[0].is_the_active_one);
        assert!(!images[1].is_the_active_one);
    }

    #[tokio::test]
    async fn test_close_moves_active_image() {
        let host = SandboxHost::with_defaults();
        {
            let mut state = host.state();
            for title in ["a", "b"] {
                state.open_image(SandboxImage {
                    title: title.to_string(),
                    width: 1,
                    height: 1,
                    slices: 1,
                    channels: 1,
                    frames: 1,
                });
            }
        }

        let outcome = host.execute_script("return images.close('b')").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::success("boolean", json!(true)));

        let images = host.current_state().await.unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].is_the_active_one);
    }

    #[tokio::test]
    async fn test_editor_round_trip_and_replace() {
        let host = SandboxHost::with_defaults();

        host.show_or_update_script("print('one')", "a.ext").await.unwrap();
        assert_eq!(
            host.script_from_editor("a.ext").await.unwrap().as_deref(),
            Some("print('one')")
        );

        host.show_or_update_script("print('two')", "a.ext").await.unwrap();
        assert_eq!(
            host.script_from_editor("a.ext").await.unwrap().as_deref(),
            Some("print('two')")
        );
    }

    #[tokio::test]
    async fn test_editor_groovy_extension_is_optional() {
        let host = SandboxHost::with_defaults();
        host.show_or_update_script("return 1", "measure.groovy").await.unwrap();
        assert_eq!(
            host.script_from_editor("measure").await.unwrap().as_deref(),
            Some("return 1")
        );
    }

    #[tokio::test]
    async fn test_unknown_title_is_none() {
        let host = SandboxHost::with_defaults();
        assert_eq!(host.script_from_editor("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scripts_see_editor() {
        let host = SandboxHost::with_defaults();
        host.show_or_update_script("return 7", "seven").await.unwrap();

        let outcome = host
            .execute_script("editor.put('copy', editor.get('seven')) return editor.get('copy')")
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::success("string", json!("return 7")));
    }

    #[tokio::test]
    async fn test_launcher_shows_ui() {
        let launcher = SandboxLauncher::new(Duration::from_secs(1), true);
        let companion = launcher.launch().await.unwrap();
        assert!(companion.current_state().await.unwrap().is_empty());
    }
}
