//! Interleaving of many simulated cases into one live event stream.
//!
//! Each in-flight case occupies a channel. New traces go to the channel that became idle first,
//! and the next event to emit is always the earliest head among all channels.

use std::collections::VecDeque;

use plg_core::ConfigError;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::trace;

use crate::simulation::{
    Event,
    Trace,
};

/// How traces are interleaved into a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfiguration {
    /// Number of cases interleaved at once.
    pub maximum_parallel_instances: usize,
    /// Gap before a trace starts on a busy channel, as a fraction of the trace's own duration.
    pub time_fraction_before_new_trace: f64,
}

impl Default for StreamConfiguration {
    fn default() -> Self {
        Self {
            maximum_parallel_instances: 10,
            time_fraction_before_new_trace: 0.0,
        }
    }
}

impl StreamConfiguration {
    /// At least one channel and a non-negative gap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::at_least("maximum_parallel_instances", 1, self.maximum_parallel_instances)?;
        if self.time_fraction_before_new_trace.is_finite() && self.time_fraction_before_new_trace >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                field: "time_fraction_before_new_trace",
                reason: format!("{} is not a non-negative number", self.time_fraction_before_new_trace),
            })
        }
    }
}

/// An event scheduled on the stream, with its time shifted onto the stream's clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEvent {
    /// Case the event belongs to.
    pub case_id: String,
    /// Channel the case occupies.
    pub channel: usize,
    /// Milliseconds on the stream's clock.
    pub time: i64,
    /// The event as simulated.
    pub event: Event,
}

/// Per-channel queues of events waiting to be emitted.
#[derive(Debug)]
pub struct StreamBuffer {
    /// Stream settings.
    config: StreamConfiguration,
    /// One queue per parallel instance.
    channels: Vec<VecDeque<StreamEvent>>,
}

impl StreamBuffer {
    /// Buffer with `maximum_parallel_instances` empty channels.
    #[must_use]
    pub fn new(config: StreamConfiguration) -> Self {
        let channels = (0..config.maximum_parallel_instances.max(1)).map(|_| VecDeque::new()).collect();
        Self { config, channels }
    }

    /// Events waiting across all channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.iter().map(VecDeque::len).sum()
    }

    /// Whether no event is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(VecDeque::is_empty)
    }

    /// Channel a new trace should go to: the first empty one, otherwise the one whose last
    /// event is the oldest.
    #[must_use]
    pub fn channel_to_enqueue(&self) -> usize {
        if let Some(empty) = self.channels.iter().position(VecDeque::is_empty) {
            return empty;
        }
        self.channels
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.back().map_or(i64::MIN, |e| e.time))
            .map_or(0, |(i, _)| i)
    }

    /// Channel holding the earliest pending event.
    #[must_use]
    pub fn channel_with_event_to_stream(&self) -> Option<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.front().map(|e| (i, e.time)))
            .min_by_key(|&(_, time)| time)
            .map(|(i, _)| i)
    }

    /// Schedule every event of `trace` and return the channel it was placed on.
    pub fn enqueue_trace(&mut self, trace: &Trace) -> usize {
        let channel = self.channel_to_enqueue();
        let Some(first) = trace.events.first() else {
            return channel;
        };

        let shift = match self.channels[channel].back() {
            Some(last) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                let wait = (trace.duration() as f64 * self.config.time_fraction_before_new_trace) as i64;
                last.time + wait - first.timestamp
            },
            None => 0,
        };
        trace!(case_id = %trace.case_id, channel, shift, "trace enqueued");

        self.channels[channel].extend(trace.events.iter().map(|event| StreamEvent {
            case_id: trace.case_id.clone(),
            channel,
            time: event.timestamp + shift,
            event: event.clone(),
        }));
        channel
    }

    /// Pop the earliest pending event.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        let channel = self.channel_with_event_to_stream()?;
        self.channels[channel].pop_front()
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::simulation::Lifecycle;

    fn trace(case_id: &str, times: &[i64]) -> Trace {
        let mut t = Trace::new(case_id);
        t.events = times.iter().map(|&ms| Event::new("A", Lifecycle::None, ms)).collect();
        t
    }

    fn buffer(channels: usize, fraction: f64) -> StreamBuffer {
        StreamBuffer::new(StreamConfiguration {
            maximum_parallel_instances: channels,
            time_fraction_before_new_trace: fraction,
        })
    }

    #[rstest]
    fn test_empty_channels_fill_first() {
        let mut b = buffer(2, 0.0);
        assert_eq!(b.enqueue_trace(&trace("case_0", &[0, 10])), 0);
        assert_eq!(b.enqueue_trace(&trace("case_1", &[0, 50])), 1);
        // channel 0 ends at 10, channel 1 at 50
        assert_eq!(b.channel_to_enqueue(), 0);
    }

    #[rstest]
    fn test_busy_channel_shift() {
        let mut b = buffer(1, 0.5);
        b.enqueue_trace(&trace("case_0", &[0, 100]));
        b.enqueue_trace(&trace("case_1", &[1000, 1200]));

        let times: Vec<_> = std::iter::from_fn(|| b.next_event()).map(|e| (e.case_id, e.time)).collect();
        assert_eq!(
            times,
            vec![
                ("case_0".to_owned(), 0),
                ("case_0".to_owned(), 100),
                ("case_1".to_owned(), 200),
                ("case_1".to_owned(), 400),
            ]
        );
    }

    #[rstest]
    fn test_next_event_picks_earliest_head() {
        let mut b = buffer(3, 0.0);
        b.enqueue_trace(&trace("case_0", &[30]));
        b.enqueue_trace(&trace("case_1", &[10]));
        b.enqueue_trace(&trace("case_2", &[20]));
        assert_eq!(b.len(), 3);

        let order: Vec<_> = std::iter::from_fn(|| b.next_event()).map(|e| e.case_id).collect();
        assert_eq!(order, vec!["case_1", "case_2", "case_0"]);
        assert!(b.is_empty());
        assert_eq!(b.next_event(), None);
    }

    #[rstest]
    fn test_empty_trace_is_ignored() {
        let mut b = buffer(2, 0.0);
        assert_eq!(b.enqueue_trace(&trace("case_0", &[])), 0);
        assert!(b.is_empty());
    }

    #[rstest]
    fn test_zero_channels_rejected() {
        let config = StreamConfiguration { maximum_parallel_instances: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
