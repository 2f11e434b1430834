//! The reducer abstraction: pure decisions about state and follow-up work.
//!
//! A [`Reducer`] receives an action, mutates its state in place, and returns
//! an [`Effect`] describing any asynchronous work to start. Reducers never
//! perform work themselves; they only describe it. That split keeps every
//! feature deterministic and testable without a runtime.
//!
//! Features compose structurally:
//!
//! - tuples `(a, b, ...)` run members left to right on the same state and
//!   merge their effects;
//! - [`Scope`](crate::scope::Scope) embeds a child feature behind a state
//!   lens and an action case;
//! - [`Reducer::if_let`] runs a child feature while optional child state is
//!   present, cancelling its effects on dismissal;
//! - [`Reducer::for_each`] runs an element feature for every row of an
//!   [`IdentifiedArray`], cancelling a row's effects on removal.
//!
//! The operator combinators run the child before the parent, so a parent
//! observing a child's delegate action always sees the child's final state.

use std::marker::PhantomData;

use crate::effect::Effect;
use crate::elements::ForEach;
use crate::identified::{Identifiable, IdentifiedArray};
use crate::optional::IfLet;
use crate::scope::CasePath;

/// A unit of feature logic: `(inout State, Action) -> Effect`.
pub trait Reducer: Send + Sync + 'static {
    /// The feature's state. Cloned for snapshots published to observers.
    type State: Clone + Send + Sync + 'static;

    /// The feature's action. Cloned when composition fans one action out to
    /// several members.
    type Action: Clone + Send + 'static;

    /// Applies `action` to `state` and describes any follow-up work.
    fn reduce(&self, state: &mut Self::State, action: Self::Action) -> Effect<Self::Action>;

    /// Embeds `child` to run while `child_state` resolves to `Some`.
    ///
    /// On each child action the child reducer runs first, then `self`. When
    /// `self` clears the child state (dismissal), all effects started by the
    /// child are cancelled.
    fn if_let<Child>(
        self,
        child_state: impl for<'a> Fn(&'a mut Self::State) -> Option<&'a mut Child::State>
            + Send
            + Sync
            + 'static,
        child_action: CasePath<Self::Action, Child::Action>,
        child: Child,
    ) -> IfLet<Self, Child>
    where
        Self: Sized,
        Child: Reducer,
    {
        IfLet::new(self, child_state, child_action, child)
    }

    /// Embeds `element` to run against individual rows of an identified
    /// collection.
    ///
    /// Element actions carry the row's id; the element reducer runs against
    /// that row first, then `self`. When `self` removes a row, all effects
    /// started by that row are cancelled.
    fn for_each<Element>(
        self,
        elements: impl for<'a> Fn(&'a mut Self::State) -> &'a mut IdentifiedArray<Element::State>
            + Send
            + Sync
            + 'static,
        element_action: CasePath<
            Self::Action,
            (<Element::State as Identifiable>::Id, Element::Action),
        >,
        element: Element,
    ) -> ForEach<Self, Element>
    where
        Self: Sized,
        Element: Reducer,
        Element::State: Identifiable,
    {
        ForEach::new(self, elements, element_action, element)
    }
}

/// Wraps a closure as a [`Reducer`]. The workhorse for feature bodies.
pub struct Reduce<S, A, F> {
    run: F,
    _marker: PhantomData<fn(&mut S, A)>,
}

impl<S, A, F> Reduce<S, A, F>
where
    F: Fn(&mut S, A) -> Effect<A> + Send + Sync + 'static,
{
    pub fn new(run: F) -> Self {
        Self {
            run,
            _marker: PhantomData,
        }
    }
}

impl<S, A, F> Reducer for Reduce<S, A, F>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    F: Fn(&mut S, A) -> Effect<A> + Send + Sync + 'static,
{
    type State = S;
    type Action = A;

    fn reduce(&self, state: &mut S, action: A) -> Effect<A> {
        (self.run)(state, action)
    }
}

/// A reducer that ignores every action. Useful as a placeholder leaf.
pub struct EmptyReducer<S, A> {
    _marker: PhantomData<fn(&mut S, A)>,
}

impl<S, A> EmptyReducer<S, A> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S, A> Default for EmptyReducer<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> Reducer for EmptyReducer<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
{
    type State = S;
    type Action = A;

    fn reduce(&self, _state: &mut S, _action: A) -> Effect<A> {
        Effect::none()
    }
}

// Tuples of reducers over the same state and action run left to right and
// merge their effects. Listing child scopes before the parent core preserves
// child-before-parent ordering for plain scopes.
macro_rules! impl_reducer_for_tuple {
    ($($member:ident : $idx:tt),+) => {
        impl<State, Action, $($member),+> Reducer for ($($member,)+)
        where
            State: Clone + Send + Sync + 'static,
            Action: Clone + Send + 'static,
            $($member: Reducer<State = State, Action = Action>,)+
        {
            type State = State;
            type Action = Action;

            fn reduce(&self, state: &mut State, action: Action) -> Effect<Action> {
                let mut effects = Vec::new();
                $(
                    effects.push(self.$idx.reduce(state, action.clone()));
                )+
                Effect::merge(effects)
            }
        }
    };
}

impl_reducer_for_tuple!(R0: 0, R1: 1);
impl_reducer_for_tuple!(R0: 0, R1: 1, R2: 2);
impl_reducer_for_tuple!(R0: 0, R1: 1, R2: 2, R3: 3);
impl_reducer_for_tuple!(R0: 0, R1: 1, R2: 2, R3: 3, R4: 4);
impl_reducer_for_tuple!(R0: 0, R1: 1, R2: 2, R3: 3, R4: 4, R5: 5);
