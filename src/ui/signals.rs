use tokio::sync::watch;

/// Application-wide streams that worklog panels subscribe to
pub struct Signals {
    viewport: watch::Sender<egui::Vec2>,
    jira_url: watch::Sender<String>,
}

impl Signals {
    pub fn new(jira_url: String) -> Self {
        let (viewport, _) = watch::channel(egui::Vec2::ZERO);
        let (jira_url, _) = watch::channel(jira_url);
        Self { viewport, jira_url }
    }

    /// Returns true if the size differs from the last one published
    pub fn publish_viewport(&self, size: egui::Vec2) -> bool {
        self.viewport.send_if_modified(|current| {
            if *current != size {
                *current = size;
                true
            } else {
                false
            }
        })
    }

    pub fn publish_jira_url(&self, url: String) {
        self.jira_url.send_if_modified(|current| {
            if *current != url {
                *current = url;
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe_viewport(&self) -> watch::Receiver<egui::Vec2> {
        self.viewport.subscribe()
    }

    pub fn subscribe_jira_url(&self) -> watch::Receiver<String> {
        self.jira_url.subscribe()
    }
}
