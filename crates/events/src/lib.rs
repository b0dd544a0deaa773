//! Typed events, trigger masks, the event bus and the micro-batch accumulator.
//!
//! Internal occurrences become [`Event`]s. Batch-prone kinds go through the
//! [`EventAccumulator`], which folds sub-events sharing a correlation key into
//! one `AGGREGATED` event per window; everything else is published directly on
//! the [`EventBus`], which hands it to every subscriber whose [`TriggerMask`]
//! intersects the event kind.

pub mod accumulator;
pub mod bus;
pub mod error;
pub mod event;
pub mod trigger;

pub use {
    accumulator::{EventAccumulator, KeyFn},
    bus::{EventBus, EventSink, EventSubscriber},
    error::{Error, Result},
    event::{AccumulationBucket, AccumulationKey, Event, EventPayload},
    trigger::TriggerMask,
};
