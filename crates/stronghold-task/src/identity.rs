//! Task identity rules: how a (player, category, stop parameter) triple
//! becomes a [`TaskId`].
//!
//! Each category registers one rule made of a factory, which builds a
//! blank stop parameter, and a derivation, which turns a filled-in
//! parameter into an id. Starting a task derives its id from the task's
//! own stop parameter; stopping one builds a parameter from the factory,
//! lets the caller fill it in, and derives the same id.

use std::any::{Any, type_name};
use std::collections::HashMap;

use stronghold_protocol::PlayerId;

use crate::{TaskCategory, TaskError, TaskId};

type Factory = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;
type Derive = Box<dyn Fn(&PlayerId, TaskCategory, &dyn Any) -> Option<String> + Send + Sync>;

struct IdentityRule {
    expected: &'static str,
    factory: Factory,
    derive: Derive,
}

/// The per-category identity rules, fixed once the dispatcher is built.
#[derive(Default)]
pub(crate) struct IdentityRules {
    rules: HashMap<TaskCategory, IdentityRule>,
}

impl IdentityRules {
    pub(crate) fn insert<P, F, D>(&mut self, category: TaskCategory, factory: F, derive: D)
    where
        P: Any + Send + Sync,
        F: Fn() -> P + Send + Sync + 'static,
        D: Fn(&PlayerId, TaskCategory, &P) -> String + Send + Sync + 'static,
    {
        let rule = IdentityRule {
            expected: type_name::<P>(),
            factory: Box::new(move || Box::new(factory()) as Box<dyn Any + Send>),
            derive: Box::new(move |player_id: &PlayerId, category: TaskCategory, param: &dyn Any| {
                param
                    .downcast_ref::<P>()
                    .map(|param| derive(player_id, category, param))
            }),
        };
        if self.rules.insert(category, rule).is_some() {
            tracing::warn!(%category, "identity rule replaced");
        }
    }

    pub(crate) fn contains(&self, category: TaskCategory) -> bool {
        self.rules.contains_key(&category)
    }

    fn rule(&self, category: TaskCategory) -> Result<&IdentityRule, TaskError> {
        self.rules
            .get(&category)
            .ok_or(TaskError::MissingIdentityRule(category))
    }

    /// Derives the id for an already-built stop parameter.
    pub(crate) fn derive(
        &self,
        player_id: &PlayerId,
        category: TaskCategory,
        param: &dyn Any,
    ) -> Result<TaskId, TaskError> {
        let rule = self.rule(category)?;
        (rule.derive)(player_id, category, param)
            .map(TaskId::from)
            .ok_or(TaskError::StopParamMismatch {
                category,
                expected: rule.expected,
            })
    }

    /// Builds a stop parameter from the category's factory, lets
    /// `configure` fill it in, and derives the id.
    pub(crate) fn derive_with<P: Any>(
        &self,
        player_id: &PlayerId,
        category: TaskCategory,
        configure: impl FnOnce(&mut P),
    ) -> Result<TaskId, TaskError> {
        let rule = self.rule(category)?;
        let mut param = (rule.factory)();
        let typed = param
            .downcast_mut::<P>()
            .ok_or(TaskError::StopParamMismatch {
                category,
                expected: rule.expected,
            })?;
        configure(typed);
        self.derive(player_id, category, &*param)
    }
}

/// `"{code}-{player}"`: at most one task of the category per player.
pub fn player_scoped(player_id: &PlayerId, category: TaskCategory) -> String {
    format!("{}-{player_id}", category.code())
}

/// `"{code}-{key}-{player}"`: one task per player per key (building id,
/// mission id, ...).
pub fn keyed(player_id: &PlayerId, category: TaskCategory, key: &str) -> String {
    format!("{}-{key}-{player_id}", category.code())
}
