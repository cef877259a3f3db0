use crate::config::RenderConfig;
use crate::registry::SuspenseRoot;
use crate::session::RequestSession;
use core_types::{BoundaryIndex, RequestId};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Render-scoped state handed to components and callbacks.
///
/// Clones share the error-boundary counter and the request session, so a
/// task spawned from a render keeps allocating from the same sequence.
#[derive(Clone, Default)]
pub struct RenderContext {
    config: RenderConfig,
    root: Option<SuspenseRoot>,
    session: Option<Rc<RequestSession>>,
    error_boundaries: Rc<Cell<BoundaryIndex>>,
}

impl RenderContext {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub(crate) fn for_request(
        root: &SuspenseRoot,
        session: Rc<RequestSession>,
        config: RenderConfig,
    ) -> Self {
        Self {
            config,
            root: Some(root.clone()),
            session: Some(session),
            error_boundaries: Rc::default(),
        }
    }

    pub fn config(&self) -> RenderConfig {
        self.config
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.session.as_ref().map(|session| session.id())
    }

    pub fn suspense_root(&self) -> Option<&SuspenseRoot> {
        self.root.as_ref()
    }

    pub(crate) fn session(&self) -> Option<&Rc<RequestSession>> {
        self.session.as_ref()
    }

    pub fn next_error_boundary(&self) -> BoundaryIndex {
        let index = self.error_boundaries.get();
        self.error_boundaries.set(index + 1);
        index
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("config", &self.config)
            .field("request_id", &self.request_id())
            .field("error_boundaries", &self.error_boundaries.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_boundary_indices_are_shared_by_clones() {
        let cx = RenderContext::default();
        let other = cx.clone();
        assert_eq!(cx.next_error_boundary(), 0);
        assert_eq!(other.next_error_boundary(), 1);
        assert_eq!(cx.next_error_boundary(), 2);
    }

    #[test]
    fn plain_context_has_no_request() {
        let cx = RenderContext::new(RenderConfig::without_script());
        assert_eq!(cx.request_id(), None);
        assert!(cx.suspense_root().is_none());
        assert!(!cx.config().auto_script);
    }
}
