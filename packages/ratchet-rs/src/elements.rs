//! Per-element child features over an identified collection.
//!
//! [`ForEach`] routes `(id, action)` pairs to the matching row of an
//! [`IdentifiedArray`] and runs an element reducer against just that row.
//! Each row owns an effect scope derived from its id, so removing the row
//! cancels everything it still has in flight, and a stale action for a row
//! that no longer exists is dropped with a warning instead of touching a
//! neighbour.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::effect::Effect;
use crate::id::EffectId;
use crate::identified::{Identifiable, IdentifiedArray};
use crate::reducer::Reducer;
use crate::scope::CasePath;

type ElementId<Element> = <<Element as Reducer>::State as Identifiable>::Id;

type ElementsLens<Base, Element> = Arc<
    dyn for<'a> Fn(
            &'a mut <Base as Reducer>::State,
        ) -> &'a mut IdentifiedArray<<Element as Reducer>::State>
        + Send
        + Sync,
>;

/// Built by [`Reducer::for_each`]. Runs the addressed element before the
/// base, and cancels a removed row's effects.
pub struct ForEach<Base, Element>
where
    Base: Reducer,
    Element: Reducer,
    Element::State: Identifiable,
{
    base: Base,
    element: Element,
    elements: ElementsLens<Base, Element>,
    element_action: CasePath<Base::Action, (ElementId<Element>, Element::Action)>,
}

impl<Base, Element> ForEach<Base, Element>
where
    Base: Reducer,
    Element: Reducer,
    Element::State: Identifiable,
{
    pub(crate) fn new(
        base: Base,
        elements: impl for<'a> Fn(&'a mut Base::State) -> &'a mut IdentifiedArray<Element::State>
            + Send
            + Sync
            + 'static,
        element_action: CasePath<Base::Action, (ElementId<Element>, Element::Action)>,
        element: Element,
    ) -> Self {
        Self {
            base,
            element,
            elements: Arc::new(elements),
            element_action,
        }
    }
}

impl<Base, Element> Reducer for ForEach<Base, Element>
where
    Base: Reducer,
    Element: Reducer,
    Element::State: Identifiable,
{
    type State = Base::State;
    type Action = Base::Action;

    fn reduce(&self, state: &mut Base::State, action: Base::Action) -> Effect<Base::Action> {
        let element_effect = match self.element_action.extract(&action) {
            Some((id, element_action)) => {
                let array = (self.elements)(state);
                match array.get_mut(&id) {
                    Some(row) => {
                        let case = self.element_action.clone();
                        let embed_id = id.clone();
                        // Derived from the id alone, so the scope survives
                        // reconstruction of the reducer tree (recursive
                        // features rebuild their combinators per dispatch).
                        let scope = EffectId::for_element(&id);
                        self.element
                            .reduce(row, element_action)
                            .map(move |produced| case.embed((embed_id.clone(), produced)))
                            .scoped(scope)
                    }
                    None => {
                        warn!(id = ?id, "element action for a missing row; dropping it");
                        Effect::none()
                    }
                }
            }
            None => Effect::none(),
        };

        let before: Vec<ElementId<Element>> = (self.elements)(state).ids().cloned().collect();
        let base_effect = self.base.reduce(state, action);

        let array = (self.elements)(state);
        let removed: Vec<ElementId<Element>> = before
            .into_iter()
            .filter(|id| !array.contains(id))
            .collect();

        let mut effects = vec![element_effect, base_effect];
        for id in removed {
            debug!(id = ?id, "row removed; cancelling its effects");
            effects.push(Effect::cancel(EffectId::for_element(&id)));
        }
        Effect::merge(effects)
    }
}
