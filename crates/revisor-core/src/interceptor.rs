// ABOUTME: Typed pre-write hooks that inspect or rewrite each snapshot row before it is queued.
// ABOUTME: Registered explicitly on a Versioning; returning None rejects the whole save.

use crate::entity::Entity;
use crate::snapshot::VersionRow;

/// A hook from a candidate row to the row that will be written. Receives the
/// owning entity for context.
pub type Interceptor = Box<dyn Fn(&Entity, VersionRow) -> Option<VersionRow> + Send + Sync>;

/// Ordered list of interceptors. Each one sees the previous one's output.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Interceptor>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, interceptor: F)
    where
        F: Fn(&Entity, VersionRow) -> Option<VersionRow> + Send + Sync + 'static,
    {
        self.interceptors.push(Box::new(interceptor));
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the row through every interceptor. `None` means a hook vetoed it.
    pub fn apply(&self, entity: &Entity, row: VersionRow) -> Option<VersionRow> {
        self.interceptors
            .iter()
            .try_fold(row, |row, interceptor| interceptor(entity, row))
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}
