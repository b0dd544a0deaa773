//! Converges managed remote items per target towards desired content.
//!
//! A pass walks targets one at a time. For each target it rediscovers the
//! tracked set when dirty, fetches every tracked item, edits items whose
//! sub tag is still wanted, deletes the rest and creates what is missing.
//! Any create or delete leaves the target dirty so the next pass starts from
//! a fresh listing. Failures abort only the target they happen on.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use {
    herald_channels::{Error, ErrorKind, ItemId, RemoteGateway, Target},
    herald_config::HeraldConfig,
    tracing::{Level, debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, labels, reconciler as reconciler_metrics};

use crate::{
    strategy::{ContentStrategy, DesiredContentBlock},
    tag,
};

/// What the reconciler believes about one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationState {
    /// Tracked items may not match the remote side; edit and delete are
    /// forbidden until a fresh discovery.
    pub dirty: bool,
    /// At least one discovery succeeded.
    pub loaded: bool,
    /// Managed items by remote id, with their sub tag.
    pub tracked: BTreeMap<ItemId, String>,
}

impl Default for ReconciliationState {
    fn default() -> Self {
        Self {
            dirty: true,
            loaded: false,
            tracked: BTreeMap::new(),
        }
    }
}

/// Tally of one pass across all targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Targets rediscovered before reconciling.
    pub discovered: usize,
    pub edits: usize,
    pub creates: usize,
    pub deletes: usize,
    /// Targets whose pass stopped early.
    pub aborted: usize,
}

impl PassReport {
    pub fn mutations(&self) -> usize {
        self.edits + self.creates + self.deletes
    }
}

/// A remote call that failed, with the operation that issued it.
struct Failure {
    op: &'static str,
    error: Error,
}

impl Failure {
    fn at(op: &'static str) -> impl FnOnce(Error) -> Self {
        move |error| Self { op, error }
    }
}

pub struct DisplayReconciler<S> {
    strategy: Arc<S>,
    gateway: Arc<dyn RemoteGateway>,
    targets: Vec<Target>,
    states: BTreeMap<Target, ReconciliationState>,
}

impl<S: ContentStrategy> DisplayReconciler<S> {
    pub fn new(strategy: Arc<S>, gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            strategy,
            gateway,
            targets: Vec::new(),
            states: BTreeMap::new(),
        }
    }

    pub fn strategy(&self) -> &Arc<S> {
        &self.strategy
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn state(&self, target: &Target) -> Option<&ReconciliationState> {
        self.states.get(target)
    }

    /// Replace the target set. A change marks every remaining target dirty.
    /// Returns whether the set changed.
    pub fn set_targets(&mut self, targets: Vec<Target>) -> bool {
        if targets == self.targets {
            return false;
        }
        self.states.retain(|t, _| targets.contains(t));
        for state in self.states.values_mut() {
            state.dirty = true;
        }
        info!(
            board = self.strategy.name(),
            count = targets.len(),
            "display targets changed"
        );
        self.targets = targets;
        true
    }

    /// Re-read configured targets and keep those that resolve.
    pub async fn refresh_targets(&mut self, config: &HeraldConfig) -> bool {
        let mut resolved = Vec::new();
        for target in self.strategy.targets(config) {
            if self.gateway.resolve(&target).await {
                resolved.push(target);
            } else {
                warn!(board = self.strategy.name(), %target, "target does not resolve, skipping");
            }
        }
        self.set_targets(resolved)
    }

    /// Rebuild tracked sets for every target. Returns how many succeeded.
    pub async fn discover(&mut self) -> usize {
        let mut ok = 0;
        for target in self.targets.clone() {
            let state = self.states.entry(target).or_default();
            match discover_target(self.gateway.as_ref(), self.strategy.base_tag(), &target, state)
                .await
            {
                Ok(()) => ok += 1,
                Err(failure) => log_failure(self.strategy.name(), &target, &failure),
            }
        }
        ok
    }

    /// Drop a tracked item that was deleted out of band. The target stays
    /// as clean as it was.
    pub fn forget(&mut self, target: &Target, id: ItemId) -> bool {
        let removed = self
            .states
            .get_mut(target)
            .is_some_and(|state| state.tracked.remove(&id).is_some());
        if removed {
            debug!(board = self.strategy.name(), %target, item_id = %id, "forgot deleted item");
        }
        removed
    }

    /// Reconcile every target once, sequentially.
    pub async fn run_pass(&mut self) -> PassReport {
        let mut report = PassReport::default();
        for target in self.targets.clone() {
            self.reconcile_target(&target, &mut report).await;
        }

        #[cfg(feature = "metrics")]
        counter!(reconciler_metrics::PASSES_TOTAL, labels::MODULE => self.strategy.name().to_string())
            .increment(1);

        debug!(
            board = self.strategy.name(),
            discovered = report.discovered,
            edits = report.edits,
            creates = report.creates,
            deletes = report.deletes,
            aborted = report.aborted,
            "reconciliation pass finished"
        );
        report
    }

    async fn reconcile_target(&mut self, target: &Target, report: &mut PassReport) {
        let board = self.strategy.name();
        let base = self.strategy.base_tag();
        let state = self.states.entry(*target).or_default();

        if state.dirty || !state.loaded {
            if let Err(failure) = discover_target(self.gateway.as_ref(), base, target, state).await
            {
                log_failure(board, target, &failure);
                report.aborted += 1;
                return;
            }
            report.discovered += 1;
        }

        let desired = match self.strategy.desired_content(target).await {
            Ok(blocks) => dedup(board, target, blocks),
            Err(e) => {
                warn!(board, %target, error = %e, "could not compute desired content");
                report.aborted += 1;
                return;
            },
        };

        let mut tally = PassReport::default();
        let outcome = converge(
            self.gateway.as_ref(),
            base,
            target,
            state,
            &desired,
            &mut tally,
        )
        .await;

        if tally.creates + tally.deletes > 0 {
            state.dirty = true;
        }
        if let Err(failure) = outcome {
            if failure.error.is_not_found() {
                state.dirty = true;
            }
            log_failure(board, target, &failure);
            #[cfg(feature = "metrics")]
            counter!(reconciler_metrics::TARGETS_ABORTED_TOTAL).increment(1);
            tally.aborted += 1;
        }

        report.edits += tally.edits;
        report.creates += tally.creates;
        report.deletes += tally.deletes;
        report.aborted += tally.aborted;
    }
}

/// List the target and rebuild its tracked set from items carrying `base`.
async fn discover_target(
    gateway: &dyn RemoteGateway,
    base: &str,
    target: &Target,
    state: &mut ReconciliationState,
) -> Result<(), Failure> {
    state.dirty = true;
    note_call("list");
    let items = gateway
        .list_items(target)
        .await
        .map_err(Failure::at("list"))?;

    state.tracked = items
        .into_iter()
        .filter(|item| tag::is_managed(base, &item.content))
        .map(|item| {
            // Unparsable headers get an empty tag, which never matches and
            // so gets cleaned up.
            let sub = tag::parse_sub_tag(base, &item.content).unwrap_or_default();
            (item.id, sub.to_string())
        })
        .collect();
    state.loaded = true;
    state.dirty = false;

    #[cfg(feature = "metrics")]
    counter!(reconciler_metrics::DISCOVERIES_TOTAL, labels::RESULT => "ok").increment(1);
    debug!(%target, tracked = state.tracked.len(), "discovered managed items");
    Ok(())
}

/// Edit, delete and create until the tracked set matches `desired`.
async fn converge(
    gateway: &dyn RemoteGateway,
    base: &str,
    target: &Target,
    state: &mut ReconciliationState,
    desired: &[DesiredContentBlock],
    tally: &mut PassReport,
) -> Result<(), Failure> {
    // Fetch everything before mutating anything.
    let mut current = Vec::with_capacity(state.tracked.len());
    for (id, sub) in &state.tracked {
        note_call("fetch");
        let item = gateway
            .fetch_item(target, *id)
            .await
            .map_err(Failure::at("fetch"))?;
        current.push((*id, sub.clone(), item.content));
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut edits = Vec::new();
    let mut deletes = Vec::new();
    for (id, sub, content) in &current {
        let wanted = desired
            .iter()
            .find(|b| b.sub_tag == *sub)
            .filter(|b| !claimed.contains(b.sub_tag.as_str()));
        match wanted {
            Some(block) => {
                claimed.insert(block.sub_tag.as_str());
                let text = tag::render(base, &block.sub_tag, &block.content);
                if *content != text {
                    edits.push((*id, text));
                }
            },
            None => deletes.push(*id),
        }
    }

    for (id, text) in edits {
        note_call("edit");
        gateway
            .edit_item(target, id, &text)
            .await
            .map_err(Failure::at("edit"))?;
        tally.edits += 1;
    }

    for id in deletes {
        note_call("delete");
        match gateway.delete_item(target, id).await {
            Ok(()) => {},
            Err(e) if e.is_not_found() => {
                debug!(%target, item_id = %id, "item already gone");
            },
            Err(error) => return Err(Failure { op: "delete", error }),
        }
        state.tracked.remove(&id);
        tally.deletes += 1;
    }

    for block in desired
        .iter()
        .filter(|b| !claimed.contains(b.sub_tag.as_str()))
    {
        let text = tag::render(base, &block.sub_tag, &block.content);
        note_call("create");
        let id = gateway
            .create_item(target, &text)
            .await
            .map_err(Failure::at("create"))?;
        state.tracked.insert(id, block.sub_tag.clone());
        tally.creates += 1;
    }

    Ok(())
}

/// Drop blocks with unusable or repeated sub tags. The first block for a
/// tag wins.
fn dedup(board: &str, target: &Target, blocks: Vec<DesiredContentBlock>) -> Vec<DesiredContentBlock> {
    let mut seen = HashSet::new();
    blocks
        .into_iter()
        .filter(|block| {
            if !tag::is_valid_sub_tag(&block.sub_tag) {
                warn!(board, %target, sub_tag = %block.sub_tag, "dropping block with invalid sub tag");
                return false;
            }
            if !seen.insert(block.sub_tag.clone()) {
                warn!(board, %target, sub_tag = %block.sub_tag, "dropping duplicate sub tag");
                return false;
            }
            true
        })
        .collect()
}

/// Denied calls need an operator; vanished items heal on the next pass.
fn severity(kind: ErrorKind) -> Level {
    match kind {
        ErrorKind::Forbidden => Level::ERROR,
        ErrorKind::NotFound => Level::INFO,
        ErrorKind::InvalidTarget | ErrorKind::Transient => Level::WARN,
    }
}

fn log_failure(board: &str, target: &Target, failure: &Failure) {
    let op = failure.op;
    let e = &failure.error;
    match severity(e.kind()) {
        Level::ERROR => {
            error!(board, %target, operation = op, error = %e, "remote call denied");
        },
        Level::INFO => {
            info!(board, %target, operation = op, error = %e, "managed item vanished, rediscovering next pass");
        },
        _ => {
            warn!(board, %target, operation = op, error = %e, "remote call failed, retrying next trigger");
        },
    }

    #[cfg(feature = "metrics")]
    counter!(
        reconciler_metrics::REMOTE_ERRORS_TOTAL,
        labels::OPERATION => op,
        labels::ERROR_TYPE => e.kind().as_str()
    )
    .increment(1);
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn note_call(op: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(reconciler_metrics::REMOTE_CALLS_TOTAL, labels::OPERATION => op).increment(1);
}
