//! Author-supplied path rules, checked after the built-in validation.

use story_model::StoryNode;

use super::StoryGraph;

/// Extra validation for new paths.
///
/// A rule sees the graph as it is before the path is added.
pub trait PathRule: Send + Sync {
    /// Name reported when the rule rejects a path.
    fn name(&self) -> &str;

    /// `Err(reason)` rejects the path.
    fn check(&self, graph: &StoryGraph, start: &StoryNode, end: &StoryNode) -> Result<(), String>;
}

/// A [`PathRule`] backed by a closure.
pub struct FnRule<F> {
    name: String,
    check: F,
}

impl<F> FnRule<F>
where
    F: Fn(&StoryGraph, &StoryNode, &StoryNode) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> PathRule for FnRule<F>
where
    F: Fn(&StoryGraph, &StoryNode, &StoryNode) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, graph: &StoryGraph, start: &StoryNode, end: &StoryNode) -> Result<(), String> {
        (self.check)(graph, start, end)
    }
}
