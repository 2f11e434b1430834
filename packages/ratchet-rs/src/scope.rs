//! Embedding a child feature inside a parent.
//!
//! [`Scope`] carves the child's slice out of parent state with a lens closure
//! and routes the child's actions through a [`CasePath`] on the parent action
//! enum. Child effects are lifted back into parent effects by embedding every
//! produced action, so from the runtime's point of view only the root action
//! type exists.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::effect::Effect;
use crate::reducer::Reducer;

/// A two-way bridge between a parent action enum and one of its cases.
///
/// `extract` answers "is this parent action ours?", `embed` wraps a child
/// action back up for dispatch. Actions are `Clone`, so extraction typically
/// clones the payload out of a matched variant:
///
/// ```ignore
/// #[derive(Clone)]
/// enum ParentAction {
///     Detail(DetailAction),
///     Refresh,
/// }
///
/// let case = CasePath::new(
///     |action| match action {
///         ParentAction::Detail(inner) => Some(inner.clone()),
///         _ => None,
///     },
///     ParentAction::Detail,
/// );
/// ```
pub struct CasePath<Parent, Child> {
    extract: Arc<dyn Fn(&Parent) -> Option<Child> + Send + Sync>,
    embed: Arc<dyn Fn(Child) -> Parent + Send + Sync>,
}

impl<Parent, Child> Clone for CasePath<Parent, Child> {
    fn clone(&self) -> Self {
        Self {
            extract: self.extract.clone(),
            embed: self.embed.clone(),
        }
    }
}

impl<Parent, Child> CasePath<Parent, Child> {
    pub fn new(
        extract: impl Fn(&Parent) -> Option<Child> + Send + Sync + 'static,
        embed: impl Fn(Child) -> Parent + Send + Sync + 'static,
    ) -> Self {
        Self {
            extract: Arc::new(extract),
            embed: Arc::new(embed),
        }
    }

    pub fn extract(&self, parent: &Parent) -> Option<Child> {
        (self.extract)(parent)
    }

    pub fn embed(&self, child: Child) -> Parent {
        (self.embed)(child)
    }
}

/// Runs a child reducer against a slice of parent state whenever the parent
/// action matches the child's case.
///
/// `Scope` is for child state that is always present. List scopes before the
/// parent's core in a reducer tuple so the child handles its action before
/// the parent reacts to it. For optional or per-element children use
/// [`Reducer::if_let`] and [`Reducer::for_each`], which also manage effect
/// lifetimes.
pub struct Scope<S, A, Child: Reducer> {
    child: Child,
    child_state: Arc<dyn for<'a> Fn(&'a mut S) -> &'a mut Child::State + Send + Sync>,
    child_action: CasePath<A, Child::Action>,
    _marker: PhantomData<fn(&mut S, A)>,
}

impl<S, A, Child: Reducer> Scope<S, A, Child> {
    pub fn new(
        child_state: impl for<'a> Fn(&'a mut S) -> &'a mut Child::State + Send + Sync + 'static,
        child_action: CasePath<A, Child::Action>,
        child: Child,
    ) -> Self {
        Self {
            child,
            child_state: Arc::new(child_state),
            child_action,
            _marker: PhantomData,
        }
    }
}

impl<S, A, Child> Reducer for Scope<S, A, Child>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    Child: Reducer,
{
    type State = S;
    type Action = A;

    fn reduce(&self, state: &mut S, action: A) -> Effect<A> {
        let Some(child_action) = self.child_action.extract(&action) else {
            return Effect::none();
        };
        let child_state = (self.child_state)(state);
        let case = self.child_action.clone();
        self.child
            .reduce(child_state, child_action)
            .map(move |produced| case.embed(produced))
    }
}
