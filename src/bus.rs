//! Synchronous, named-topic publish/subscribe.
//!
//! A [`Bus::publish`] call runs every tap and then every subscriber of the
//! topic, in subscription order, before it returns. Delivery is never
//! buffered; the only source of delay in a simulation is a process timeout
//! (see [`Core`](crate::scheduler::Core)).
//!
//! Topics are bound to a [`Schema`] the first time they are advertised or
//! subscribed to. Disagreeing with that schema later is an error returned at
//! wiring time, so a running simulation never sees a mismatched message.
//!
//! ```
//! use attitude_bank::bus::Bus;
//! use attitude_bank::msgs::Imu;
//! use nalgebra::Vector3;
//! use std::{cell::Cell, rc::Rc};
//!
//! # fn main() -> attitude_bank::Result<()> {
//! let bus = Bus::new();
//! let publisher = bus.advertise::<Imu>("imu")?;
//!
//! let received = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&received);
//! bus.subscribe("imu", move |_bus, _msg: &Imu| {
//!     counter.set(counter.get() + 1);
//!     Ok(())
//! })?;
//!
//! bus.publish(&publisher, &Imu { time: 0.0, gyro: Vector3::zeros() })?;
//! assert_eq!(received.get(), 1);
//! # Ok(())
//! # }
//! ```

use std::{
    cell::RefCell,
    collections::{btree_map::Entry, BTreeMap},
    marker::PhantomData,
    rc::Rc,
};

use crate::error::{Error, Result};
use crate::msgs::{Message, Payload, Schema};

type Callback = Rc<RefCell<dyn FnMut(&Bus, &Payload) -> Result<()>>>;
type Tap = Rc<RefCell<dyn FnMut(&str, &Payload)>>;

struct Topic {
    schema: Schema,
    subscribers: Vec<Callback>,
}

/// A handle for publishing messages of type `M` on one topic.
///
/// Obtained from [`Bus::advertise`], which has already checked the schema.
#[derive(Debug)]
pub struct Publisher<M> {
    topic: Rc<str>,
    _message: PhantomData<fn(M)>,
}

impl<M> Publisher<M> {
    /// The topic this publisher writes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<M> Clone for Publisher<M> {
    fn clone(&self) -> Self {
        Self {
            topic: Rc::clone(&self.topic),
            _message: PhantomData,
        }
    }
}

/// The message bus of one simulation.
#[derive(Default)]
pub struct Bus {
    topics: RefCell<BTreeMap<String, Topic>>,
    taps: RefCell<Vec<Tap>>,
}

impl Bus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, topic: &str, schema: Schema) -> Result<()> {
        match self.topics.borrow_mut().entry(topic.to_owned()) {
            Entry::Occupied(entry) if entry.get().schema != schema => Err(Error::SchemaMismatch {
                topic: topic.to_owned(),
                expected: entry.get().schema,
                found: schema,
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                log::debug!("registered topic `{topic}` as {schema:?}");
                entry.insert(Topic {
                    schema,
                    subscribers: Vec::new(),
                });
                Ok(())
            }
        }
    }

    /// Declare that messages of type `M` will be published on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the topic is already bound to a
    /// different schema.
    pub fn advertise<M: Message>(&self, topic: &str) -> Result<Publisher<M>> {
        self.register(topic, M::SCHEMA)?;
        Ok(Publisher {
            topic: Rc::from(topic),
            _message: PhantomData,
        })
    }

    /// Call `callback` for every message published on `topic`.
    ///
    /// The callback receives the bus so that it can publish in turn. An error
    /// returned from the callback aborts the publication and is returned to
    /// the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the topic is already bound to a
    /// different schema.
    pub fn subscribe<M, F>(&self, topic: &str, mut callback: F) -> Result<()>
    where
        M: Message,
        F: FnMut(&Bus, &M) -> Result<()> + 'static,
    {
        self.register(topic, M::SCHEMA)?;

        let name = topic.to_owned();
        let erased: Callback = Rc::new(RefCell::new(move |bus: &Bus, payload: &Payload| {
            let msg = M::from_payload(payload).ok_or_else(|| Error::SchemaMismatch {
                topic: name.clone(),
                expected: M::SCHEMA,
                found: payload.schema(),
            })?;
            callback(bus, msg)
        }));

        if let Some(entry) = self.topics.borrow_mut().get_mut(topic) {
            entry.subscribers.push(erased);
        }
        log::debug!("subscribed to `{topic}`");
        Ok(())
    }

    /// Observe every publication on every topic, including topics created
    /// after the tap was installed.
    ///
    /// Taps run before the subscribers of the topic, so they see messages
    /// in publication order.
    pub fn tap<F>(&self, tap: F)
    where
        F: FnMut(&str, &Payload) + 'static,
    {
        self.taps.borrow_mut().push(Rc::new(RefCell::new(tap)));
    }

    /// The schema bound to `topic`, if it exists.
    #[must_use]
    pub fn schema(&self, topic: &str) -> Option<Schema> {
        self.topics.borrow().get(topic).map(|t| t.schema)
    }

    /// Names of all registered topics, in lexical order.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.borrow().keys().cloned().collect()
    }

    /// Deliver a copy of `msg` to every tap and subscriber of the
    /// publisher's topic.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a subscriber, or
    /// [`Error::ReentrantDelivery`] if a subscriber that is still running
    /// would receive a nested publication.
    pub fn publish<M: Message>(&self, publisher: &Publisher<M>, msg: &M) -> Result<()> {
        let topic = publisher.topic();
        let payload = msg.clone().into_payload();

        let taps = self.taps.borrow().clone();
        for tap in &taps {
            let mut tap = tap.try_borrow_mut().map_err(|_| Error::ReentrantDelivery {
                topic: topic.to_owned(),
            })?;
            (&mut *tap)(topic, &payload);
        }

        // clone the handles so that subscribers can publish and subscribe
        let subscribers = self
            .topics
            .borrow()
            .get(topic)
            .map(|t| t.subscribers.clone())
            .unwrap_or_default();
        for subscriber in &subscribers {
            let mut callback = subscriber
                .try_borrow_mut()
                .map_err(|_| Error::ReentrantDelivery {
                    topic: topic.to_owned(),
                })?;
            (&mut *callback)(self, &payload)?;
        }
        Ok(())
    }
}
