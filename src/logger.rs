//! In-memory recording of everything published during a run.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use crate::bus::Bus;
use crate::error::{Error, Result};
use crate::msgs::{Message, Payload};

/// One published message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    /// Topic the message was published on.
    pub topic: String,
    /// Message timestamp in seconds.
    pub time: f64,
    /// The message itself.
    pub payload: Payload,
}

/// Records every publication on a [`Bus`].
///
/// The logger taps the bus, so it also sees topics created after it was
/// installed.
pub struct Logger {
    records: Rc<RefCell<Vec<Record>>>,
}

impl Logger {
    /// Start recording every publication on `bus`.
    #[must_use]
    pub fn attach(bus: &Bus) -> Self {
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&records);
        bus.tap(move |topic, payload| {
            sink.borrow_mut().push(Record {
                topic: topic.to_owned(),
                time: payload.time(),
                payload: payload.clone(),
            });
        });
        Self { records }
    }

    /// Number of messages recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// The recorded history as a topic-indexed table.
    ///
    /// The records stay with the logger, so this can be called again later
    /// in the run.
    #[must_use]
    pub fn log(&self) -> Log {
        let mut topics: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for record in self.records.borrow().iter() {
            topics
                .entry(record.topic.clone())
                .or_default()
                .push(record.clone());
        }
        Log { topics }
    }
}

/// The history of a run, indexed by topic.
///
/// Within a topic the records are in publication order. That is time order
/// only as long as the publishers stamp their messages monotonically; a
/// replayed or out-of-order sample is kept where it was published.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Log {
    topics: BTreeMap<String, Vec<Record>>,
}

impl Log {
    /// Names of the recorded topics, in lexical order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Every record published on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTopic`] if nothing was published on `topic`.
    pub fn topic(&self, topic: &str) -> Result<&[Record]> {
        self.topics
            .get(topic)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownTopic(topic.to_owned()))
    }

    /// The timestamps of the records published on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTopic`] if nothing was published on `topic`.
    pub fn times(&self, topic: &str) -> Result<Vec<f64>> {
        Ok(self.topic(topic)?.iter().map(|r| r.time).collect())
    }

    /// The messages published on `topic`, as records of type `M`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTopic`] if nothing was published on `topic`,
    /// or [`Error::SchemaMismatch`] if the topic carries another schema.
    pub fn series<M: Message>(&self, topic: &str) -> Result<Vec<&M>> {
        self.topic(topic)?
            .iter()
            .map(|record| {
                M::from_payload(&record.payload).ok_or_else(|| Error::SchemaMismatch {
                    topic: topic.to_owned(),
                    expected: record.payload.schema(),
                    found: M::SCHEMA,
                })
            })
            .collect()
    }
}
