//! A model of what a browser ends up with after running a chunk stream.
//!
//! Document chunks are appended. Suspense patches are parked as templates
//! and applied the way the bootstrap's `$RC` does it: swap the placeholder
//! for the template content, then retry every other parked template until
//! none applies. Error-boundary patches apply immediately, like their
//! inline script. Protocol misuse is collected in `violations` instead of
//! panicking, so tests can assert on it.

use core_types::{ChunkKind, RunId};
use html::patch::{
    BOOTSTRAP_SCRIPT, find_error_placeholder, find_suspense_placeholder, placeholder_runs,
};

const SUSPENSE_TEMPLATE: &str = "<template id=\"N:";
const ERROR_TEMPLATE: &str = "<template data-eb>";

#[derive(Debug, Default)]
pub struct ClientDocument {
    html: String,
    runtime: bool,
    templates: Vec<(RunId, String)>,
    applied: Vec<RunId>,
    violations: Vec<String>,
}

impl ClientDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose host already loaded the patch function.
    pub fn with_runtime() -> Self {
        Self {
            runtime: true,
            ..Self::default()
        }
    }

    pub fn replay(chunks: &[(ChunkKind, String)]) -> Self {
        let mut doc = Self::new();
        for (kind, chunk) in chunks {
            doc.apply(*kind, chunk);
        }
        doc
    }

    pub fn apply(&mut self, kind: ChunkKind, chunk: &str) {
        match kind {
            ChunkKind::Document => self.html.push_str(chunk),
            ChunkKind::Bootstrap => {
                if chunk != BOOTSTRAP_SCRIPT {
                    self.violations.push("unexpected bootstrap markup".to_string());
                }
                if self.runtime {
                    self.violations.push("bootstrap sent twice".to_string());
                }
                self.runtime = true;
            }
            ChunkKind::Patch if chunk.starts_with(SUSPENSE_TEMPLATE) => {
                self.apply_suspense_patch(chunk)
            }
            ChunkKind::Patch if chunk.starts_with(ERROR_TEMPLATE) => self.apply_error_patch(chunk),
            ChunkKind::Patch => self
                .violations
                .push(format!("unrecognized patch: {}", crate::escape_text(chunk))),
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Runs whose fallback placeholder is still in the document.
    pub fn pending_runs(&self) -> Vec<RunId> {
        placeholder_runs(&self.html)
    }

    pub fn applied_runs(&self) -> &[RunId] {
        &self.applied
    }

    pub fn parked_templates(&self) -> usize {
        self.templates.len()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn apply_suspense_patch(&mut self, chunk: &str) {
        let Some((run, content)) = parse_suspense_patch(chunk) else {
            self.violations
                .push(format!("malformed suspense patch: {}", crate::escape_text(chunk)));
            return;
        };
        if !self.runtime {
            self.violations
                .push(format!("patch for run {run} before bootstrap"));
        }
        self.templates.push((run, content.to_string()));
        if self.runtime && !self.swap(run) {
            self.violations
                .push(format!("patch for run {run} has no placeholder yet"));
        }
    }

    fn swap(&mut self, run: RunId) -> bool {
        let Some(at) = self.templates.iter().position(|(r, _)| *r == run) else {
            return false;
        };
        let Some(span) = find_suspense_placeholder(&self.html, run) else {
            return false;
        };
        let (_, content) = self.templates.remove(at);
        self.html.replace_range(span, &content);
        self.applied.push(run);

        loop {
            let waiting: Vec<RunId> = self.templates.iter().map(|(r, _)| *r).collect();
            let mut progressed = false;
            for other in waiting {
                if self.swap(other) {
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        true
    }

    fn apply_error_patch(&mut self, chunk: &str) {
        let Some((index, content)) = parse_error_patch(chunk) else {
            self.violations
                .push(format!("malformed error patch: {}", crate::escape_text(chunk)));
            return;
        };
        match find_error_placeholder(&self.html, index) {
            Some(span) => self.html.replace_range(span, content),
            None => self
                .violations
                .push(format!("error boundary {index} has no placeholder")),
        }
    }
}

fn parse_suspense_patch(chunk: &str) -> Option<(RunId, &str)> {
    let rest = chunk.strip_prefix(SUSPENSE_TEMPLATE)?;
    let digits = rest.find('"')?;
    let run: RunId = rest[..digits].parse().ok()?;
    let open = format!("{SUSPENSE_TEMPLATE}{run}\" data-sr>");
    let close = format!("</template><script id=\"S:{run}\" data-ss>");
    let start = open.len();
    let end = chunk.rfind(&close)?;
    (end >= start).then(|| (run, &chunk[start..end]))
}

fn parse_error_patch(chunk: &str) -> Option<(u32, &str)> {
    let end = chunk.rfind("</template><script>")?;
    let content = chunk.get(ERROR_TEMPLATE.len()..end)?;
    let marker = "getElementById('E:";
    let at = chunk.rfind(marker)? + marker.len();
    let digits = chunk[at..].find('\'')?;
    let index = chunk[at..at + digits].parse().ok()?;
    Some((index, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use html::patch::{error_boundary_patch, error_placeholder, suspense_open, suspense_patch};

    #[test]
    fn applies_patch_after_bootstrap() {
        let mut doc = ClientDocument::new();
        doc.apply(
            ChunkKind::Document,
            &format!("hi {}…</div>", suspense_open(1)),
        );
        assert_eq!(doc.pending_runs(), vec![1]);
        doc.apply(ChunkKind::Bootstrap, BOOTSTRAP_SCRIPT);
        doc.apply(ChunkKind::Patch, &suspense_patch(1, "world"));
        assert_eq!(doc.html(), "hi world");
        assert_eq!(doc.applied_runs(), &[1]);
        assert!(doc.violations().is_empty());
    }

    #[test]
    fn nested_template_waits_for_its_parent() {
        let mut doc = ClientDocument::with_runtime();
        doc.apply(ChunkKind::Document, &format!("{}a</div>", suspense_open(1)));
        doc.apply(
            ChunkKind::Patch,
            &suspense_patch(2, "inner"),
        );
        assert_eq!(doc.parked_templates(), 1);
        doc.apply(
            ChunkKind::Patch,
            &suspense_patch(1, &format!("[{}…</div>]", suspense_open(2))),
        );
        assert_eq!(doc.html(), "[inner]");
        assert_eq!(doc.parked_templates(), 0);
    }

    #[test]
    fn patch_without_bootstrap_is_a_violation() {
        let mut doc = ClientDocument::new();
        doc.apply(ChunkKind::Document, &format!("{}x</div>", suspense_open(1)));
        doc.apply(ChunkKind::Patch, &suspense_patch(1, "y"));
        assert_eq!(doc.violations().len(), 1);
        assert_eq!(doc.pending_runs(), vec![1]);
    }

    #[test]
    fn error_patch_replaces_placeholder() {
        let mut doc = ClientDocument::new();
        doc.apply(ChunkKind::Document, &format!("<p>{}</p>", error_placeholder(4)));
        doc.apply(ChunkKind::Patch, &error_boundary_patch(4, "<b>ok</b>"));
        assert_eq!(doc.html(), "<p><b>ok</b></p>");
        assert!(doc.violations().is_empty());
    }
}
