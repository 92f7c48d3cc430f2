//! # samplering - lock-free sample ring
//!
//! A fixed-capacity ring buffer of `f64` audio samples shared between one
//! producer thread and one consumer thread, meant for real-time audio
//! callbacks where blocking and allocation are off limits.
//!
//! ## Design
//!
//! - Backing storage holds `capacity + 1` samples so that empty and full are
//!   told apart by index comparison alone
//! - The writer only advances the write index, the reader only the read index
//! - Indices are published with Release stores and observed with Acquire loads
//! - `write` and `read` are partial transfers: they move what fits and return
//!   the count, never blocking or failing
//! - [`SampleRing::split`] turns the ring into a [`SampleWriter`] and a
//!   [`SampleReader`] that can live on different threads
//!
//! ## Example
//!
//! ```
//! use samplering::SampleRing;
//!
//! let mut ring = SampleRing::new(4).unwrap();
//!
//! // Only four samples fit
//! assert_eq!(ring.write(&[0.1, 0.2, 0.3, 0.4, 0.5]), 4);
//!
//! let mut out = [0.0; 2];
//! assert_eq!(ring.read(&mut out), 2);
//! assert_eq!(out, [0.1, 0.2]);
//!
//! // Hand each side to its own thread
//! let (mut writer, mut reader) = ring.split();
//! let producer = std::thread::spawn(move || writer.write(&[0.6]));
//! assert_eq!(producer.join().unwrap(), 1);
//!
//! let mut out = [0.0; 8];
//! assert_eq!(reader.read(&mut out), 3);
//! assert_eq!(&out[..3], &[0.3, 0.4, 0.6]);
//! ```

#![warn(missing_docs)]

mod ring_buffer;

pub use ring_buffer::{RingError, SampleReader, SampleRing, SampleWriter};
