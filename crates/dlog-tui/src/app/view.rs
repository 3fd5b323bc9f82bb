use dlog_logs::Document;
use dlog_session::CachedDocument;

/// Line store the log viewer can page through
pub trait ViewSource {
    /// Title shown above the logs
    fn caption(&self) -> String;

    /// Number of complete lines
    fn line_count(&self) -> usize;

    /// Up to `count` lines starting at `start`
    fn lines_in(&self, start: usize, count: usize) -> Vec<String>;
}

impl ViewSource for Document {
    fn caption(&self) -> String {
        Document::caption(self)
    }

    fn line_count(&self) -> usize {
        self.len()
    }

    fn lines_in(&self, start: usize, count: usize) -> Vec<String> {
        self.range(start, count)
    }
}

impl ViewSource for CachedDocument {
    fn caption(&self) -> String {
        self.document().caption()
    }

    fn line_count(&self) -> usize {
        self.document().len()
    }

    fn lines_in(&self, start: usize, count: usize) -> Vec<String> {
        self.document().range(start, count)
    }
}
