use std::collections::HashSet;
use thingspace_common::Spatial;

/// The world container: the mutable scene aggregate that receives attach and
/// detach operations. Membership is by handle; names are only used for the
/// bare-spatial deletion path.
#[derive(Debug, Default)]
pub struct SceneRoot {
    children: HashSet<Spatial>,
}

impl SceneRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a representation. Attaching the same handle twice is a no-op.
    pub fn attach(&mut self, spatial: Spatial) {
        tracing::trace!(handle = spatial.handle(), name = spatial.name(), "attach");
        self.children.insert(spatial);
    }

    /// Detach by handle. Returns the detached representation, if present.
    pub fn detach(&mut self, spatial: &Spatial) -> Option<Spatial> {
        self.children.take(spatial)
    }

    /// Detach the first child carrying the given name. Bare spatials entered
    /// the scene without a store entry, so name is all the caller has.
    pub fn detach_by_name(&mut self, name: &str) -> Option<Spatial> {
        let found = self.children.iter().find(|s| s.name() == name).cloned()?;
        self.children.take(&found)
    }

    pub fn contains(&self, spatial: &Spatial) -> bool {
        self.children.contains(spatial)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
