//! In-memory gateway for tests and preview runs.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    gateway::{ItemId, RemoteGateway, RemoteItem},
    target::Target,
};

/// Gateway operation, used in the call log and for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Fetch,
    Create,
    Edit,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Fetch => "fetch",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }

    /// Create, edit and delete change remote state.
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Create | Self::Edit | Self::Delete)
    }
}

/// One recorded gateway call. Failed calls are recorded too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: Operation,
    pub target: Target,
    pub item_id: Option<ItemId>,
}

/// Failure to inject on the next call of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    Forbidden,
    Transient,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    items: BTreeMap<Target, BTreeMap<ItemId, String>>,
    unresolvable: HashSet<Target>,
    calls: Vec<GatewayCall>,
    faults: HashMap<Operation, VecDeque<Fault>>,
}

/// Gateway backed by maps. No transport, no rate limit.
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
    verbose: bool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Start id allocation at `first_id`.
    pub fn with_first_id(first_id: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: first_id.max(1),
                ..Inner::default()
            }),
            verbose: false,
        }
    }

    /// Log every mutation at info level, for dry runs.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Place an item at the target without recording a call.
    pub fn seed(&self, target: Target, content: impl Into<String>) -> ItemId {
        let mut inner = self.lock();
        let id = ItemId(inner.next_id);
        inner.next_id += 1;
        inner
            .items
            .entry(target)
            .or_default()
            .insert(id, content.into());
        id
    }

    /// Delete an item behind the reconciler's back. Returns whether it existed.
    pub fn remove(&self, target: &Target, id: ItemId) -> bool {
        let mut inner = self.lock();
        inner
            .items
            .get_mut(target)
            .is_some_and(|items| items.remove(&id).is_some())
    }

    pub fn set_resolvable(&self, target: Target, resolvable: bool) {
        let mut inner = self.lock();
        if resolvable {
            inner.unresolvable.remove(&target);
        } else {
            inner.unresolvable.insert(target);
        }
    }

    /// Make the next call of `op` fail with `fault`. Faults queue up per operation.
    pub fn fail_next(&self, op: Operation, fault: Fault) {
        self.lock().faults.entry(op).or_default().push_back(fault);
    }

    /// Current items at the target, ordered by id.
    pub fn items(&self, target: &Target) -> Vec<RemoteItem> {
        self.lock()
            .items
            .get(target)
            .map(|items| {
                items
                    .iter()
                    .map(|(id, content)| RemoteItem {
                        id: *id,
                        content: content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of recorded calls for `op`.
    pub fn count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Number of recorded create, edit and delete calls.
    pub fn mutation_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.op.is_mutation()).count()
    }

    /// Record the call and pop an injected fault for it, if any.
    fn begin(
        &self,
        inner: &mut Inner,
        op: Operation,
        target: &Target,
        item_id: Option<ItemId>,
    ) -> Result<()> {
        inner.calls.push(GatewayCall {
            op,
            target: *target,
            item_id,
        });
        if inner.unresolvable.contains(target) {
            return Err(Error::Unresolved { target: *target });
        }
        let fault = inner.faults.get_mut(&op).and_then(VecDeque::pop_front);
        match fault {
            None => Ok(()),
            Some(Fault::NotFound) => Err(Error::not_found(*target, item_id.unwrap_or(ItemId(0)))),
            Some(Fault::Forbidden) => Err(Error::forbidden(format!(
                "{} at {target}",
                op.as_str()
            ))),
            Some(Fault::Transient) => Err(Error::transient(format!(
                "injected failure on {}",
                op.as_str()
            ))),
        }
    }

    fn trace(&self, op: Operation, target: &Target, id: ItemId) {
        if self.verbose {
            info!(operation = op.as_str(), %target, item_id = %id, "preview gateway call");
        } else {
            debug!(operation = op.as_str(), %target, item_id = %id, "in-memory gateway call");
        }
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn resolve(&self, target: &Target) -> bool {
        !self.lock().unresolvable.contains(target)
    }

    async fn list_items(&self, target: &Target) -> Result<Vec<RemoteItem>> {
        {
            let mut inner = self.lock();
            self.begin(&mut inner, Operation::List, target, None)?;
        }
        Ok(self.items(target))
    }

    async fn fetch_item(&self, target: &Target, id: ItemId) -> Result<RemoteItem> {
        let mut inner = self.lock();
        self.begin(&mut inner, Operation::Fetch, target, Some(id))?;
        inner
            .items
            .get(target)
            .and_then(|items| items.get(&id))
            .map(|content| RemoteItem {
                id,
                content: content.clone(),
            })
            .ok_or_else(|| Error::not_found(*target, id))
    }

    async fn create_item(&self, target: &Target, content: &str) -> Result<ItemId> {
        let id = {
            let mut inner = self.lock();
            self.begin(&mut inner, Operation::Create, target, None)?;
            let id = ItemId(inner.next_id);
            inner.next_id += 1;
            inner
                .items
                .entry(*target)
                .or_default()
                .insert(id, content.to_string());
            if let Some(call) = inner.calls.last_mut() {
                call.item_id = Some(id);
            }
            id
        };
        self.trace(Operation::Create, target, id);
        Ok(id)
    }

    async fn edit_item(&self, target: &Target, id: ItemId, content: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            self.begin(&mut inner, Operation::Edit, target, Some(id))?;
            let slot = inner
                .items
                .get_mut(target)
                .and_then(|items| items.get_mut(&id))
                .ok_or_else(|| Error::not_found(*target, id))?;
            *slot = content.to_string();
        }
        self.trace(Operation::Edit, target, id);
        Ok(())
    }

    async fn delete_item(&self, target: &Target, id: ItemId) -> Result<()> {
        {
            let mut inner = self.lock();
            self.begin(&mut inner, Operation::Delete, target, Some(id))?;
            let removed = inner
                .items
                .get_mut(target)
                .is_some_and(|items| items.remove(&id).is_some());
            if !removed {
                return Err(Error::not_found(*target, id));
            }
        }
        self.trace(Operation::Delete, target, id);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const T: Target = Target::Channel { id: 10 };

    #[tokio::test]
    async fn create_edit_delete_round() {
        let gw = InMemoryGateway::with_first_id(7);
        let id = gw.create_item(&T, "hello").await.unwrap();
        assert_eq!(id, ItemId(7));

        gw.edit_item(&T, id, "world").await.unwrap();
        assert_eq!(gw.fetch_item(&T, id).await.unwrap().content, "world");

        gw.delete_item(&T, id).await.unwrap();
        assert!(gw.fetch_item(&T, id).await.unwrap_err().is_not_found());
        assert_eq!(gw.mutation_count(), 3);
        assert_eq!(
            gw.calls()[0],
            GatewayCall {
                op: Operation::Create,
                target: T,
                item_id: Some(ItemId(7)),
            }
        );
    }

    #[tokio::test]
    async fn injected_faults_fire_once_in_order() {
        let gw = InMemoryGateway::new();
        gw.fail_next(Operation::List, Fault::Forbidden);
        gw.fail_next(Operation::List, Fault::Transient);

        let first = gw.list_items(&T).await.unwrap_err();
        assert_eq!(first.kind(), crate::ErrorKind::Forbidden);
        let second = gw.list_items(&T).await.unwrap_err();
        assert_eq!(second.kind(), crate::ErrorKind::Transient);
        assert!(gw.list_items(&T).await.unwrap().is_empty());
        assert_eq!(gw.count(Operation::List), 3);
    }

    #[tokio::test]
    async fn out_of_band_removal_and_resolution() {
        let gw = InMemoryGateway::new();
        let id = gw.seed(T, "seeded");
        assert!(gw.calls().is_empty());
        assert!(gw.remove(&T, id));
        assert!(!gw.remove(&T, id));

        gw.set_resolvable(T, false);
        assert!(!gw.resolve(&T).await);
        assert!(matches!(
            gw.list_items(&T).await,
            Err(Error::Unresolved { .. })
        ));
        gw.set_resolvable(T, true);
        assert!(gw.resolve(&T).await);
    }
}
