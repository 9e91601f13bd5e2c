//! Snowflake ids.
//!
//! From the most significant bit: 42 bits of milliseconds since an [`Epoch`],
//! 5 bits worker id, 5 bits process id and a 12 bit increment. Ids generated
//! by one generator sort in creation order, even when more than 4096 are
//! requested within one millisecond or the clock steps backwards.

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};
use tracing::warn;

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;

pub const WORKER_ID_OFFSET: u32 = 17;
pub const WORKER_ID_LENGTH: u32 = 5;

pub const PROCESS_ID_OFFSET: u32 = 12;
pub const PROCESS_ID_LENGTH: u32 = 5;

pub const INCREMENT_OFFSET: u32 = 0;
pub const INCREMENT_LENGTH: u32 = 12;

const fn mask(length: u32) -> u64 {
    (1 << length) - 1
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

macro_rules! snowflake_part {
    ($name:ident: $repr:ty, offset = $offset:ident, len = $length:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (u64::from(value) <= mask($length)).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }

            fn extract(snowflake: u64) -> Self {
                #[allow(clippy::cast_possible_truncation)]
                Self(((snowflake >> $offset) & mask($length)) as $repr)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = <$repr>::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

snowflake_part!(WorkerId: u8, offset = WORKER_ID_OFFSET, len = WORKER_ID_LENGTH);
snowflake_part!(ProcessId: u8, offset = PROCESS_ID_OFFSET, len = PROCESS_ID_LENGTH);
snowflake_part!(SnowflakeIncrement: u16, offset = INCREMENT_OFFSET, len = INCREMENT_LENGTH);

impl SnowflakeIncrement {
    #[must_use]
    pub fn next(self) -> Self {
        Self((self.0 + 1) & 0x0FFF)
    }
}

/// Milliseconds since `SnowflakeEpoch`.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct SnowflakeTimestamp<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> SnowflakeTimestamp<SnowflakeEpoch> {
    #[must_use]
    pub fn new(millis: u64) -> Option<Self> {
        (millis <= mask(TIMESTAMP_LENGTH)).then_some(Self(millis, PhantomData))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }
}

impl<SnowflakeEpoch: Epoch> SnowflakeTimestamp<SnowflakeEpoch> {
    #[must_use]
    pub fn from_time_unchecked(value: UtcDateTime) -> Self {
        Self::try_from(value).expect("Cannot create timestamp.")
    }
}

impl<SnowflakeEpoch: Epoch> TryFrom<UtcDateTime> for SnowflakeTimestamp<SnowflakeEpoch> {
    type Error = SnowflakeTimestampError;

    fn try_from(value: UtcDateTime) -> Result<Self, Self::Error> {
        let millis = (value - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
        if millis < 0 {
            return Err(Self::Error::TimeBeforeEpoch);
        }
        let millis = u64::try_from(millis).map_err(|_| Self::Error::TimestampTooLarge)?;
        Self::new(millis).ok_or(Self::Error::TimestampTooLarge)
    }
}

impl<SnowflakeEpoch: Epoch> From<SnowflakeTimestamp<SnowflakeEpoch>> for UtcDateTime {
    fn from(value: SnowflakeTimestamp<SnowflakeEpoch>) -> Self {
        // At most 42 bits, so the cast cannot wrap.
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(value.0.cast_signed())
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp: SnowflakeTimestamp<SnowflakeEpoch>,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: SnowflakeIncrement,
    ) -> Self {
        Self::new(
            timestamp.get() << TIMESTAMP_OFFSET
                | u64::from(worker_id.get()) << WORKER_ID_OFFSET
                | u64::from(process_id.get()) << PROCESS_ID_OFFSET
                | u64::from(increment.get()) << INCREMENT_OFFSET,
        )
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp<SnowflakeEpoch> {
        SnowflakeTimestamp(self.0 >> TIMESTAMP_OFFSET, PhantomData)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        WorkerId::extract(self.0)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        ProcessId::extract(self.0)
    }

    #[must_use]
    pub fn increment(self) -> SnowflakeIncrement {
        SnowflakeIncrement::extract(self.0)
    }
}

impl<SnowflakeEpoch: Epoch> Snowflake<SnowflakeEpoch> {
    /// The moment this snowflake was generated, to the millisecond.
    #[must_use]
    pub fn created_at(self) -> UtcDateTime {
        self.timestamp().into()
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

#[derive_where(Clone, Debug)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    /// Timestamp and increment of the last generated id.
    last: Option<(SnowflakeTimestamp<SnowflakeEpoch>, SnowflakeIncrement)>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last: None,
        }
    }

    /// Generates an id for `time`, or for the last used millisecond if `time`
    /// is not past it. Once that millisecond has run out of increments the id
    /// borrows the following one.
    ///
    /// # Panics
    ///
    /// If the resulting timestamp does not fit into a snowflake.
    pub fn generate_at(&mut self, time: UtcDateTime) -> Snowflake<SnowflakeEpoch> {
        let now = SnowflakeTimestamp::from_time_unchecked(time);

        let (timestamp, increment) = match self.last {
            Some((last, _)) if now > last => (now, SnowflakeIncrement::default()),
            Some((last, increment)) => {
                if now < last {
                    warn!(
                        behind_ms = last.get() - now.get(),
                        "Clock went backwards, staying on the last snowflake timestamp"
                    );
                }
                match increment.next() {
                    next if next.get() == 0 => (
                        last.next().expect("Snowflake timestamps exhausted."),
                        next,
                    ),
                    next => (last, next),
                }
            }
            None => (now, SnowflakeIncrement::default()),
        };
        self.last = Some((timestamp, increment));

        Snowflake::from_parts(timestamp, self.worker_id, self.process_id, increment)
    }

    pub fn generate(&mut self) -> Snowflake<SnowflakeEpoch> {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeIncrement, SnowflakeTimestamp,
        SnowflakeTimestampError, WorkerId,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-01-01 00:00);
    }

    #[test]
    fn part_ranges() {
        for legal in [0, 0xD, 0x1F] {
            assert!(WorkerId::new(legal).is_some());
            assert!(ProcessId::new(legal).is_some());
        }
        for illegal in [0x20, 0xF0, u8::MAX] {
            assert!(WorkerId::new(illegal).is_none());
            assert!(ProcessId::new(illegal).is_none());
        }

        assert!(SnowflakeIncrement::new(0xFFF).is_some());
        assert!(SnowflakeIncrement::new(0x1000).is_none());

        assert!(SnowflakeTimestamp::<MillennialEpoch>::new(0x03FF_FFFF_FFFF).is_some());
        assert!(SnowflakeTimestamp::<MillennialEpoch>::new(0x0400_0000_0000).is_none());
    }

    #[test]
    fn timestamp_conversion() {
        let time = utc_datetime!(2025-10-24 10:00:00.123);
        let timestamp = SnowflakeTimestamp::<MillennialEpoch>::try_from(time).unwrap();
        assert_eq!(UtcDateTime::from(timestamp), time);

        assert_eq!(
            SnowflakeTimestamp::<MillennialEpoch>::try_from(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimestampError::TimeBeforeEpoch)
        );
        assert_eq!(
            SnowflakeTimestamp::<MillennialEpoch>::try_from(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimestampError::TimestampTooLarge)
        );
    }

    #[test]
    fn increment_wraps() {
        let increment = SnowflakeIncrement::new(0xFFE).unwrap().next();
        assert_eq!(increment.get(), 0xFFF);
        assert_eq!(increment.next().get(), 0);
    }

    #[test]
    fn parts_survive_packing() {
        let timestamp = SnowflakeTimestamp::from_time_unchecked(utc_datetime!(2025-10-24 10:30));
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();
        let increment = SnowflakeIncrement::new(100).unwrap();

        let snowflake =
            Snowflake::<MillennialEpoch>::from_parts(timestamp, worker_id, process_id, increment);

        assert_eq!(snowflake.timestamp(), timestamp);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), increment);
        assert_eq!(snowflake.created_at(), utc_datetime!(2025-10-24 10:30));
    }

    #[test]
    fn generated_ids_sort_in_creation_order() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::new(10).unwrap(),
            ProcessId::new(0).unwrap(),
        );
        let time = utc_datetime!(2025-10-24 10:55);

        let first = generator.generate_at(time);
        let second = generator.generate_at(time);
        let later = generator.generate_at(time + Duration::milliseconds(1));

        assert!(first < second);
        assert!(second < later);
        assert_eq!(second.increment().get(), 1);
        assert_eq!(later.increment().get(), 0);
    }

    #[test]
    fn exhausted_millisecond_moves_on_to_the_next() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::new(3).unwrap(),
            ProcessId::new(1).unwrap(),
        );
        let time = utc_datetime!(2025-10-24 11:00);

        let ids: Vec<_> = (0..5000).map(|_| generator.generate_at(time)).collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ids[4095].created_at(), time);
        assert_eq!(ids[4096].created_at(), time + Duration::milliseconds(1));
        assert_eq!(ids[4096].increment().get(), 0);

        // Catching up with the borrowed millisecond keeps counting in it.
        let caught_up = generator.generate_at(time + Duration::milliseconds(1));
        assert!(ids[4999] < caught_up);
    }

    #[test]
    fn clock_going_backwards_keeps_order() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::new(0).unwrap(),
            ProcessId::new(0).unwrap(),
        );
        let time = utc_datetime!(2025-10-24 11:30);

        let before = generator.generate_at(time);
        let after = generator.generate_at(time - Duration::seconds(2));

        assert!(before < after);
        assert_eq!(after.created_at(), time);
    }
}
