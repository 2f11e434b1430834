//! Optional child features (presentation).
//!
//! [`IfLet`] runs a child reducer while the parent holds `Some` child state,
//! the shape of a presented sheet or detail screen. The combinator gives the
//! child feature an effect lifetime: work the child starts lives under a
//! scope that is cancelled the moment the parent clears the child state, so
//! a dismissed screen cannot keep feeding actions into the store.

use std::sync::Arc;

use tracing::warn;

use crate::effect::Effect;
use crate::id::EffectId;
use crate::reducer::Reducer;
use crate::scope::CasePath;

type StateLens<Base, Child> = Arc<
    dyn for<'a> Fn(
            &'a mut <Base as Reducer>::State,
        ) -> Option<&'a mut <Child as Reducer>::State>
        + Send
        + Sync,
>;

/// Built by [`Reducer::if_let`]. Runs the child before the base, and cancels
/// the child's effects when the base dismisses it.
pub struct IfLet<Base: Reducer, Child: Reducer> {
    base: Base,
    child: Child,
    child_state: StateLens<Base, Child>,
    child_action: CasePath<Base::Action, Child::Action>,
    scope: EffectId,
}

impl<Base: Reducer, Child: Reducer> IfLet<Base, Child> {
    pub(crate) fn new(
        base: Base,
        child_state: impl for<'a> Fn(&'a mut Base::State) -> Option<&'a mut Child::State>
            + Send
            + Sync
            + 'static,
        child_action: CasePath<Base::Action, Child::Action>,
        child: Child,
    ) -> Self {
        Self {
            base,
            child,
            child_state: Arc::new(child_state),
            child_action,
            // One presentation slot per combinator instance. Reducers are
            // built once and shared for the store's lifetime, so this id is
            // stable across dispatches.
            scope: EffectId::new(),
        }
    }
}

impl<Base, Child> Reducer for IfLet<Base, Child>
where
    Base: Reducer,
    Child: Reducer,
{
    type State = Base::State;
    type Action = Base::Action;

    fn reduce(&self, state: &mut Base::State, action: Base::Action) -> Effect<Base::Action> {
        let child_effect = match self.child_action.extract(&action) {
            Some(child_action) => match (self.child_state)(state) {
                Some(child_state) => {
                    let case = self.child_action.clone();
                    self.child
                        .reduce(child_state, child_action)
                        .map(move |produced| case.embed(produced))
                        .scoped(self.scope)
                }
                None => {
                    warn!("child action arrived while child state is absent; dropping it");
                    Effect::none()
                }
            },
            None => Effect::none(),
        };

        // Presence can only have changed through the child's own mutation so
        // far; the base decides dismissal.
        let present_before_base = (self.child_state)(state).is_some();
        let base_effect = self.base.reduce(state, action);
        let dismissed = present_before_base && (self.child_state)(state).is_none();

        let mut effects = vec![child_effect, base_effect];
        if dismissed {
            effects.push(Effect::cancel(self.scope));
        }
        Effect::merge(effects)
    }
}
