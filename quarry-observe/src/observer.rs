//! Live recipe observers.
//!
//! A [`RecipeObserver`] is the bridge between a recipe and a list consumer:
//! it keeps an ordered, optionally sectioned snapshot of the recipe's result
//! set, recomputes it on every save that touches the observed record type,
//! and pushes one [`ChangeBatch`](crate::ChangeBatch) per save cycle to its
//! sink inside a `will_change`/`did_change` bracket.
//!
//! The store holds the registration by weak handle only: dropping the
//! observer (or calling [`detach`](RecipeObserver::detach)) ends delivery,
//! and an observer owned by a dead screen is never called.

use crate::diff::{diff, RowKey, SectionSnapshot};
use crate::{ChangeBatch, ChangeSink};
use quarry_store::{Context, RecordRef, SaveNotification, SaveSubscriber, Store};
use quarry_types::{Recipe, RecordId, SortDescriptor};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Lifecycle of an observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverState {
    Idle,
    Fetching,
    Live,
}

struct LiveState {
    machine: ObserverState,
    recipe: Recipe,
    sections: Vec<SectionSnapshot>,
}

struct ObserverInner<S: ChangeSink> {
    record_type: String,
    section_key: Option<String>,
    live: RefCell<LiveState>,
    sink: RefCell<S>,
}

/// A live binding between a record type, a recipe, and a change sink.
pub struct RecipeObserver<S: ChangeSink + 'static> {
    inner: Rc<ObserverInner<S>>,
}

impl<S: ChangeSink + 'static> RecipeObserver<S> {
    /// Registers a new observer with the store. The observer starts idle;
    /// call [`reload`](Self::reload) to arm it.
    ///
    /// With a section key, results are grouped into sections by the string
    /// rendering of that payload field, and the fetch is ordered by it ahead
    /// of the recipe's own sort keys.
    pub fn attach(
        store: &Store,
        record_type: impl Into<String>,
        section_key: Option<String>,
        sink: S,
    ) -> Self {
        let inner = Rc::new(ObserverInner {
            record_type: record_type.into(),
            section_key,
            live: RefCell::new(LiveState {
                machine: ObserverState::Idle,
                recipe: Recipe::default(),
                sections: Vec::new(),
            }),
            sink: RefCell::new(sink),
        });
        let strong: Rc<dyn SaveSubscriber> = Rc::clone(&inner) as Rc<dyn SaveSubscriber>;
        let weak: Weak<dyn SaveSubscriber> = Rc::downgrade(&strong);
        store.subscribe(weak);
        Self { inner }
    }

    /// Replaces the live recipe, re-executes the fetch, and emits a
    /// synthetic full-reload batch (all sections replaced) to the sink.
    pub fn reload(&self, store: &Store, recipe: Recipe) {
        {
            let mut live = self.inner.live.borrow_mut();
            live.machine = ObserverState::Fetching;
            live.recipe = recipe;
        }
        self.inner.recompute(store.main_context(), true);
        self.inner.live.borrow_mut().machine = ObserverState::Live;
    }

    /// Ends delivery and returns the observer to idle. Dropping the observer
    /// has the same effect on delivery.
    pub fn detach(&self, store: &Store) {
        let strong: Rc<dyn SaveSubscriber> = Rc::clone(&self.inner) as Rc<dyn SaveSubscriber>;
        store.unsubscribe(&strong);
        let mut live = self.inner.live.borrow_mut();
        live.machine = ObserverState::Idle;
        live.sections.clear();
    }

    /// True while the observer reacts to saves.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.live.borrow().machine == ObserverState::Live
    }

    /// The observed record type.
    #[must_use]
    pub fn record_type(&self) -> String {
        self.inner.record_type.clone()
    }

    /// The current snapshot: section titles with their row identities, in
    /// display order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Vec<RecordId>)> {
        self.inner
            .live
            .borrow()
            .sections
            .iter()
            .map(|s| (s.title.clone(), s.rows.iter().map(|r| r.id).collect()))
            .collect()
    }
}

impl<S: ChangeSink> ObserverInner<S> {
    fn recompute(&self, ctx: &Context, full_reload: bool) {
        let recipe = {
            let live = self.live.borrow();
            effective_recipe(&live.recipe, self.section_key.as_deref())
        };
        match ctx.try_list(&self.record_type, &recipe) {
            Ok(refs) => {
                let new_sections = build_sections(&refs, self.section_key.as_deref());
                let batch = {
                    let live = self.live.borrow();
                    if full_reload {
                        ChangeBatch::full_reload(live.sections.len(), new_sections.len())
                    } else {
                        diff(&live.sections, &new_sections)
                    }
                };
                self.live.borrow_mut().sections = new_sections;
                self.emit(&batch);
            }
            Err(e) => {
                warn!(
                    record_type = %self.record_type,
                    error = %e,
                    "observer recompute failed; emitting empty batch"
                );
                self.emit(&ChangeBatch::default());
            }
        }
    }

    fn emit(&self, batch: &ChangeBatch) {
        let mut sink = self.sink.borrow_mut();
        sink.will_change();
        sink.apply(batch);
        sink.did_change();
    }
}

impl<S: ChangeSink> SaveSubscriber for ObserverInner<S> {
    fn on_save(&self, main: &Context, notification: &SaveNotification) {
        if self.live.borrow().machine != ObserverState::Live {
            return;
        }
        if !notification.touches(&self.record_type) {
            return;
        }
        self.recompute(main, false);
    }
}

/// The recipe actually fetched: with a section key, results must be ordered
/// by it first so sections come out contiguous.
fn effective_recipe(recipe: &Recipe, section_key: Option<&str>) -> Recipe {
    let Some(key) = section_key else {
        return recipe.clone();
    };
    let mut effective = recipe.clone();
    if effective.sorts.first().map(|s| s.key.as_str()) != Some(key) {
        effective
            .sorts
            .insert(0, SortDescriptor::ascending(key));
    }
    effective
}

fn build_sections(refs: &[RecordRef], section_key: Option<&str>) -> Vec<SectionSnapshot> {
    let row_key = |r: &RecordRef| RowKey {
        id: r.id(),
        version: r.version(),
    };
    match section_key {
        None => vec![SectionSnapshot {
            title: String::new(),
            rows: refs.iter().map(row_key).collect(),
        }],
        Some(key) => {
            let mut sections: Vec<SectionSnapshot> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            for r in refs {
                let title = section_title(r.get(key));
                let at = *index.entry(title.clone()).or_insert_with(|| {
                    sections.push(SectionSnapshot {
                        title,
                        rows: Vec::new(),
                    });
                    sections.len() - 1
                });
                sections[at].rows.push(row_key(r));
            }
            sections
        }
    }
}

/// String rendering of a section-key value. Missing and null group under
/// the empty title.
fn section_title(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
