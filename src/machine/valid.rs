//! Action menus offered by the state machine

use crate::types::{Action, BaseAction};

/// The actions a machine accepts next.
///
/// Free decoding constrains only the base form of the next action (a model
/// still chooses the label and pointer). Align mode enumerates concrete
/// actions, since only those keep the decoded graph on the gold graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidActions {
    /// Any action whose base form is listed
    Base(Vec<BaseAction>),
    /// Exactly these actions, in tie-break order
    Exact(Vec<Action>),
}

impl ValidActions {
    /// Check whether `action` is on the menu
    pub fn allows(&self, action: &Action) -> bool {
        match self {
            ValidActions::Base(bases) => bases.contains(&action.base()),
            ValidActions::Exact(actions) => actions.contains(action),
        }
    }

    /// Base forms on the menu, without duplicates, in menu order
    pub fn base_actions(&self) -> Vec<BaseAction> {
        match self {
            ValidActions::Base(bases) => bases.clone(),
            ValidActions::Exact(actions) => {
                let mut bases: Vec<BaseAction> = Vec::new();
                for action in actions {
                    let base = action.base();
                    if !bases.contains(&base) {
                        bases.push(base);
                    }
                }
                bases
            }
        }
    }

    /// Check if nothing can be applied
    pub fn is_empty(&self) -> bool {
        match self {
            ValidActions::Base(bases) => bases.is_empty(),
            ValidActions::Exact(actions) => actions.is_empty(),
        }
    }

    /// Number of entries on the menu
    pub fn len(&self) -> usize {
        match self {
            ValidActions::Base(bases) => bases.len(),
            ValidActions::Exact(actions) => actions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_menu_allows_by_base_form() {
        let menu = ValidActions::Base(vec![BaseAction::Shift, BaseAction::Node]);
        assert!(menu.allows(&Action::Shift));
        assert!(menu.allows(&Action::node("dog")));
        assert!(!menu.allows(&Action::Copy));
    }

    #[test]
    fn test_exact_menu() {
        let menu = ValidActions::Exact(vec![
            Action::left_arc(0, ":ARG0"),
            Action::left_arc(1, ":ARG0"),
            Action::Root,
        ]);
        assert!(menu.allows(&Action::left_arc(1, ":ARG0")));
        assert!(!menu.allows(&Action::left_arc(2, ":ARG0")));
        assert_eq!(
            menu.base_actions(),
            vec![BaseAction::LeftArc, BaseAction::Root]
        );
        assert_eq!(menu.len(), 3);
    }
}
