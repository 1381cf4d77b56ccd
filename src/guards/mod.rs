//! Guard primitives for flag-gated rendering
//!
//! A guard wraps some renderable content and decides, from one flag, whether
//! the content, a fallback, or nothing is shown. Guards are generic over the
//! content type so the same logic serves nav links, page sections or plain
//! strings in tests.
//!
//! Evaluations go through a [`RenderPass`], which pins one answer per flag
//! key for the duration of the pass.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::flags::{EvaluationContext, FlagEvaluator};

/// Outcome of rendering a guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    /// Flag enabled: the guarded children
    Content(T),
    /// Flag disabled and a fallback was provided
    Fallback(T),
    /// Flag disabled, nothing to show
    Nothing,
}

impl<T> Rendered<T> {
    /// Whatever is shown, if anything
    pub fn into_option(self) -> Option<T> {
        match self {
            Rendered::Content(t) | Rendered::Fallback(t) => Some(t),
            Rendered::Nothing => None,
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(self, Rendered::Content(_))
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Rendered::Nothing)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Rendered<U> {
        match self {
            Rendered::Content(t) => Rendered::Content(f(t)),
            Rendered::Fallback(t) => Rendered::Fallback(f(t)),
            Rendered::Nothing => Rendered::Nothing,
        }
    }
}

/// One render pass over a fixed evaluator and context.
///
/// The first evaluation of a key is cached; later guards on the same key in
/// this pass see the same answer.
pub struct RenderPass<'a> {
    evaluator: &'a FlagEvaluator,
    ctx: &'a EvaluationContext,
    decided: RefCell<HashMap<String, bool>>,
}

impl<'a> RenderPass<'a> {
    pub fn new(evaluator: &'a FlagEvaluator, ctx: &'a EvaluationContext) -> Self {
        Self {
            evaluator,
            ctx,
            decided: RefCell::new(HashMap::new()),
        }
    }

    /// Whether `key` is enabled in this pass. Malformed flags render disabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        if let Some(enabled) = self.decided.borrow().get(key) {
            return *enabled;
        }

        let enabled = self.evaluator.is_enabled(key, self.ctx);
        self.decided.borrow_mut().insert(key.to_string(), enabled);
        enabled
    }

    pub fn context(&self) -> &EvaluationContext {
        self.ctx
    }

    /// Render any guard in this pass
    pub fn render<G: Guard>(&self, guard: G) -> Rendered<G::Output> {
        guard.render(self)
    }
}

/// Common contract of the guard variants
pub trait Guard {
    type Output;

    fn flag_key(&self) -> &str;

    fn render(self, pass: &RenderPass<'_>) -> Rendered<Self::Output>;
}

fn gate<T>(enabled: bool, children: T, fallback: Option<T>) -> Rendered<T> {
    match (enabled, fallback) {
        (true, _) => Rendered::Content(children),
        (false, Some(fallback)) => Rendered::Fallback(fallback),
        (false, None) => Rendered::Nothing,
    }
}

/// Children when enabled, else the fallback if any, else nothing
#[derive(Debug, Clone)]
pub struct FlagGuard<T> {
    flag_key: String,
    children: T,
    fallback: Option<T>,
}

impl<T> FlagGuard<T> {
    pub fn new(flag_key: impl Into<String>, children: T) -> Self {
        Self {
            flag_key: flag_key.into(),
            children,
            fallback: None,
        }
    }

    /// Shown instead of the children while the flag is off ("coming soon")
    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl<T> Guard for FlagGuard<T> {
    type Output = T;

    fn flag_key(&self) -> &str {
        &self.flag_key
    }

    fn render(self, pass: &RenderPass<'_>) -> Rendered<T> {
        let enabled = pass.is_enabled(&self.flag_key);
        gate(enabled, self.children, self.fallback)
    }
}

/// A navigation link that does not exist while its flag is off
#[derive(Debug, Clone)]
pub struct NavLinkGuard<T> {
    flag_key: String,
    children: T,
}

impl<T> NavLinkGuard<T> {
    pub fn new(flag_key: impl Into<String>, children: T) -> Self {
        Self {
            flag_key: flag_key.into(),
            children,
        }
    }
}

impl<T> Guard for NavLinkGuard<T> {
    type Output = T;

    fn flag_key(&self) -> &str {
        &self.flag_key
    }

    fn render(self, pass: &RenderPass<'_>) -> Rendered<T> {
        let enabled = pass.is_enabled(&self.flag_key);
        gate(enabled, self.children, None)
    }
}

/// A whole page section behind a flag
#[derive(Debug, Clone)]
pub struct ModuleGuard<T> {
    flag_key: String,
    children: T,
    fallback: Option<T>,
}

impl<T> ModuleGuard<T> {
    pub fn new(flag_key: impl Into<String>, children: T) -> Self {
        Self {
            flag_key: flag_key.into(),
            children,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl<T> Guard for ModuleGuard<T> {
    type Output = T;

    fn flag_key(&self) -> &str {
        &self.flag_key
    }

    fn render(self, pass: &RenderPass<'_>) -> Rendered<T> {
        let enabled = pass.is_enabled(&self.flag_key);
        gate(enabled, self.children, self.fallback)
    }
}
