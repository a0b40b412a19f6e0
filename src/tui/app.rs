//! TUI application state management.

use std::{path::PathBuf, time::Instant};

use crate::{
    controller::RunController,
    execution::{python::EngineState, Language, RunRequest},
    store::{Snippet, SnippetStore},
    utils::download_snippet,
};

use super::editor::Editor;

/// Popup display state
#[derive(Debug, Clone, PartialEq)]
pub enum PopupState {
    /// No popup shown
    None,
    /// Key binding reference
    Help,
    /// Prompt for the title of a snippet being saved
    SaveTitle { title: String },
    /// Saved snippets browser
    Snippets { selected: usize },
}

/// Application state for the TUI
pub struct App {
    /// Source being edited
    pub editor: Editor,
    /// Language the editor content is run as
    pub language: Language,
    /// Execution state machine and its output sink
    pub controller: RunController,
    /// Snippet persistence
    pub store: SnippetStore,
    /// Snippets as last loaded from the store
    pub snippets: Vec<Snippet>,
    /// Where downloads are written
    pub download_dir: PathBuf,
    /// Popup display state
    pub popup_state: PopupState,
    /// Status message to display
    pub status_message: String,
    /// Timestamp of last Ctrl+C press for double Ctrl+C detection
    pub last_ctrl_c_time: Option<Instant>,
}

impl App {
    pub fn new(
        controller: RunController,
        store: SnippetStore,
        download_dir: PathBuf,
        language: Language,
        source: &str,
    ) -> Self {
        let (snippets, status_message) = match store.load() {
            Ok(snippets) => (snippets, "F5 run | F6 stop | F2 language | F1 help".to_string()),
            Err(err) => (Vec::new(), format!("Could not load snippets: {err}")),
        };
        let app = Self {
            editor: Editor::from_text(source),
            language,
            controller,
            store,
            snippets,
            download_dir,
            popup_state: PopupState::None,
            status_message,
            last_ctrl_c_time: None,
        };
        app.controller.warm_up(language);
        app
    }

    pub fn run_current(&mut self) {
        let request = RunRequest::new(self.language, self.editor.text());
        if self.controller.run(request).is_some() {
            self.status_message = format!("Running {}...", self.language.label());
        }
    }

    pub fn stop(&mut self) {
        if self.controller.stop() {
            self.status_message = "Stopped".to_string();
        }
    }

    pub fn toggle_language(&mut self) {
        self.set_language(self.language.toggled());
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.controller.warm_up(language);
        self.status_message = format!("Language: {}", language.label());
    }

    /// Text shown for the interpreter engine in the status bar.
    pub fn engine_label(&self) -> String {
        let engine = self.controller.engine();
        match engine.state() {
            EngineState::Uninitialized => "Python: not loaded".to_string(),
            EngineState::Initializing => "Python: loading...".to_string(),
            EngineState::Ready => format!("Python {}", engine.version().unwrap_or_else(|| "ready".into())),
            EngineState::Failed => "Python: unavailable".to_string(),
        }
    }

    pub fn open_save_prompt(&mut self) {
        self.popup_state = PopupState::SaveTitle {
            title: String::new(),
        };
    }

    pub fn save_snippet(&mut self, title: &str) {
        let title = match title.trim() {
            "" => format!("Untitled {}", self.language.label()),
            t => t.to_string(),
        };
        let snippet = Snippet::new(title.clone(), self.language, self.editor.text());
        match self.store.add(snippet) {
            Ok(snippets) => {
                self.snippets = snippets;
                self.status_message = format!("Saved \"{title}\"");
            }
            Err(err) => self.status_message = format!("Save failed: {err}"),
        }
    }

    pub fn open_snippets(&mut self) {
        match self.store.load() {
            Ok(snippets) => self.snippets = snippets,
            Err(err) => {
                self.status_message = format!("Could not load snippets: {err}");
                return;
            }
        }
        self.popup_state = PopupState::Snippets { selected: 0 };
    }

    pub fn load_snippet(&mut self, index: usize) {
        let Some(snippet) = self.snippets.get(index) else {
            return;
        };
        let request = snippet.to_request();
        let title = snippet.title.clone();
        self.editor.set_text(&request.source);
        self.set_language(request.language);
        self.status_message = format!("Loaded \"{title}\"");
    }

    pub fn delete_snippet(&mut self, index: usize) {
        match self.store.delete(index) {
            Ok(snippets) => {
                self.snippets = snippets;
                self.status_message = "Snippet deleted".to_string();
            }
            Err(err) => self.status_message = format!("Delete failed: {err}"),
        }
    }

    pub fn download(&mut self) {
        self.status_message = match download_snippet(&self.download_dir, &self.editor.text(), self.language) {
            Ok(path) => format!("Downloaded to {}", path.display()),
            Err(err) => format!("Download failed: {err:#}"),
        };
    }

    pub fn clear_output(&mut self) {
        self.controller.sink_mut().clear();
    }

    pub fn toggle_help(&mut self) {
        self.popup_state = match self.popup_state {
            PopupState::Help => PopupState::None,
            _ => PopupState::Help,
        };
    }

    /// Hide any popup
    pub fn hide_popup(&mut self) {
        self.popup_state = PopupState::None;
    }

    /// Check if any popup is shown
    pub fn is_popup_shown(&self) -> bool {
        self.popup_state != PopupState::None
    }

    /// Handle Ctrl+C press and detect double press for quit
    /// Returns true if should quit (double Ctrl+C), false otherwise
    pub fn handle_ctrl_c(&mut self) -> bool {
        const DOUBLE_CTRL_C_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

        let now = Instant::now();

        if let Some(last_time) = self.last_ctrl_c_time {
            if now.duration_since(last_time) <= DOUBLE_CTRL_C_TIMEOUT {
                // Double Ctrl+C detected - quit
                self.last_ctrl_c_time = None;
                return true;
            }
        }

        // Single Ctrl+C - stop the active run and record timestamp
        self.stop();
        self.last_ctrl_c_time = Some(now);

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;

    fn test_app(dir: &std::path::Path) -> App {
        let settings = RuntimeSettings {
            node_path: "/nonexistent/node-for-tests".into(),
            python_path: "/nonexistent/python-for-tests".into(),
            ..RuntimeSettings::default()
        };
        let (controller, _rx) = RunController::new(settings);
        App::new(
            controller,
            SnippetStore::new(dir.join("snippets.json")),
            dir.to_path_buf(),
            Language::JavaScript,
            "console.log('hi')",
        )
    }

    #[tokio::test]
    async fn test_save_and_load_snippet_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.save_snippet("greeting");

        app.editor.set_text("other");
        app.language = Language::Python;
        app.open_snippets();
        app.load_snippet(0);

        assert_eq!(app.editor.text(), "console.log('hi')");
        assert_eq!(app.language, Language::JavaScript);
    }

    #[tokio::test]
    async fn test_blank_title_gets_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.save_snippet("   ");
        assert_eq!(app.snippets[0].title, "Untitled JavaScript");
    }

    #[tokio::test]
    async fn test_download_uses_language_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.set_language(Language::Python);
        app.download();
        assert!(dir.path().join("snippet.py").exists());
    }

    #[tokio::test]
    async fn test_single_ctrl_c_does_not_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        assert!(!app.handle_ctrl_c());
        assert!(app.handle_ctrl_c());
    }
}
