use crate::host::{HostWindow, Notice, UpdateChoice, UpdatePrompt};
use crate::progress::{ProgressReporter, ProgressSnapshot};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Window double that records everything shown to it and answers prompts
/// with a fixed choice.
#[derive(Default)]
pub struct RecordingWindow {
    answer: Option<UpdateChoice>,
    notices: Mutex<Vec<Notice>>,
    prompts: Mutex<Vec<UpdatePrompt>>,
    opened: Mutex<Vec<String>>,
    revealed: Mutex<Vec<PathBuf>>,
    progress: Arc<RecordingProgress>,
}

#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingProgress {
    fn open(&self, title: &str) {
        self.events.lock().unwrap().push(format!("open {title}"));
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        self.events
            .lock()
            .unwrap()
            .push(format!("update {:?}", snapshot.fraction));
    }

    fn close(&self) {
        self.events.lock().unwrap().push("close".to_string());
    }
}

impl RecordingWindow {
    pub fn answering(answer: Option<UpdateChoice>) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<UpdatePrompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn revealed(&self) -> Vec<PathBuf> {
        self.revealed.lock().unwrap().clone()
    }

    pub fn progress_events(&self) -> Vec<String> {
        self.progress.events.lock().unwrap().clone()
    }
}

impl HostWindow for RecordingWindow {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }

    fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateChoice> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.answer
    }

    fn open_external(&self, url: &str) -> std::io::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn reveal_in_file_browser(&self, path: &Path) -> std::io::Result<()> {
        self.revealed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn progress(&self) -> Arc<dyn ProgressReporter> {
        self.progress.clone()
    }
}
