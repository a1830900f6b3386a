use crate::bootstrap::BootstrapStage;

/// Plain-text diagnostics, gated by a flag. Everything goes to stderr:
/// stdout is reserved for the message protocol in the worker binary.
#[derive(Clone, Debug)]
pub struct Logger {
    enabled: bool,
}

impl Logger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn stage(&self, stage: BootstrapStage) {
        if self.enabled {
            eprintln!("bootstrap: {}", stage.status_line());
        }
    }

    pub fn ready(&self) {
        if self.enabled {
            eprintln!("bootstrap: agent ready");
        }
    }

    pub fn bootstrap_failed(&self, detail: &str) {
        if self.enabled {
            eprintln!("bootstrap failed: {detail}");
        }
    }

    pub fn request(&self, message: &str) {
        if self.enabled {
            eprintln!("request: {}", truncate(message, 200));
        }
    }

    pub fn result(&self, text: &str) {
        if self.enabled {
            eprintln!("result: {}", truncate(text, 200));
        }
    }

    pub fn request_failed(&self, detail: &str) {
        if self.enabled {
            eprintln!("request failed: {detail}");
        }
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_owned();
    }
    let mut end = max_len.min(text.len());
    while !text.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let short = truncate(text, 2);
        assert!(short.ends_with("..."));
        assert!(short.len() <= 5);
        assert_eq!(truncate("short", 200), "short");
    }
}
