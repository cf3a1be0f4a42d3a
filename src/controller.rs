//! Run configuration and the entry point of a conversion.

use log::info;

use crate::converter::{ContainerStreamConverter, ConverterOptions, Destination};
use crate::error::{ConfigError, Result};
use crate::filter::FlagFilter;
use crate::policy::ValidationPolicy;
use crate::record::{SamRecordConverter, DEFAULT_QUALITY};
use crate::sink::RecordSink;
use crate::source::ContainerSource;
use crate::stats::{RunStatistics, RunTimings, StopReason};

/// Configuration of a conversion run
///
/// Use [`RunConfigBuilder`] to create one.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    count_only: bool,
    filter: FlagFilter,
    max_records: Option<u64>,
    validation: ValidationPolicy,
    default_quality: u8,
}
impl Default for RunConfig {
    fn default() -> Self {
        Self {
            count_only: false,
            filter: FlagFilter::default(),
            max_records: None,
            validation: ValidationPolicy::default(),
            default_quality: DEFAULT_QUALITY,
        }
    }
}
impl RunConfig {
    #[must_use]
    pub fn count_only(&self) -> bool {
        self.count_only
    }

    #[must_use]
    pub fn filter(&self) -> FlagFilter {
        self.filter
    }

    #[must_use]
    pub fn max_records(&self) -> Option<u64> {
        self.max_records
    }

    #[must_use]
    pub fn validation(&self) -> ValidationPolicy {
        self.validation
    }

    #[must_use]
    pub fn default_quality(&self) -> u8 {
        self.default_quality
    }

    fn converter_options(&self) -> ConverterOptions {
        ConverterOptions {
            filter: self.filter,
            max_records: self.max_records,
            validation: self.validation,
        }
    }
}

/// A builder for creating a [`RunConfig`]
///
/// Settings that are not set keep their defaults: conversion mode, no flag masks, no
/// record cap, silent validation and `?` as the default quality.
///
/// ```rust
/// use cramconv::{RunConfigBuilder, ValidationPolicy};
///
/// let config = RunConfigBuilder::default()
///     .count_only(true)
///     .forbidden_flags(0x900)
///     .validation(ValidationPolicy::Lenient)
///     .build()
///     .unwrap();
/// assert!(config.count_only());
/// ```
#[derive(Default)]
pub struct RunConfigBuilder {
    count_only: Option<bool>,
    required_flags: Option<u16>,
    forbidden_flags: Option<u16>,
    max_records: Option<u64>,
    validation: Option<ValidationPolicy>,
    default_quality: Option<u8>,
}
impl RunConfigBuilder {
    /// Count records and bases instead of converting them
    #[must_use]
    pub fn count_only(mut self, count_only: bool) -> Self {
        self.count_only = Some(count_only);
        self
    }

    /// Records need at least one of these flag bits to pass
    #[must_use]
    pub fn required_flags(mut self, flags: u16) -> Self {
        self.required_flags = Some(flags);
        self
    }

    /// Records with any of these flag bits are dropped
    #[must_use]
    pub fn forbidden_flags(mut self, flags: u16) -> Self {
        self.forbidden_flags = Some(flags);
        self
    }

    /// Stop after this many records were emitted or counted
    #[must_use]
    pub fn max_records(mut self, max_records: Option<u64>) -> Self {
        self.max_records = max_records;
        self
    }

    #[must_use]
    pub fn validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Quality character substituted for lost quality scores
    #[must_use]
    pub fn default_quality(mut self, default_quality: u8) -> Self {
        self.default_quality = Some(default_quality);
        self
    }

    /// Builds the configuration
    ///
    /// # Errors
    ///
    /// * `ConfigError::InvalidDefaultQuality` - If the default quality is below `!` (33)
    pub fn build(self) -> Result<RunConfig> {
        let default_quality = self.default_quality.unwrap_or(DEFAULT_QUALITY);
        // rejects characters below b'!'
        SamRecordConverter::new(default_quality)?;
        Ok(RunConfig {
            count_only: self.count_only.unwrap_or(false),
            filter: FlagFilter::new(
                self.required_flags.unwrap_or(0),
                self.forbidden_flags.unwrap_or(0),
            ),
            max_records: self.max_records,
            validation: self.validation.unwrap_or_default(),
            default_quality,
        })
    }
}

/// Outcome of a conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub statistics: RunStatistics,
    pub reason: StopReason,
    pub timings: RunTimings,
}

/// Runs the converter once according to a [`RunConfig`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RunController {
    config: RunConfig,
}
impl RunController {
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Converts or counts every container of `source`
    ///
    /// In conversion mode every passing record goes to `sink`, which is closed before
    /// returning, also when the run fails. In count-only mode the sink is not needed and,
    /// if given, only closed.
    ///
    /// # Errors
    ///
    /// * `ConfigError::MissingSink` - If converting without a sink
    /// * Read errors from the source, including corrupt containers
    /// * Write errors from the sink
    pub fn run<S>(&self, source: &mut S, sink: Option<&mut dyn RecordSink>) -> Result<RunReport>
    where
        S: ContainerSource + ?Sized,
    {
        let options = self.config.converter_options();
        let mut converter =
            ContainerStreamConverter::new(SamRecordConverter::new(self.config.default_quality)?);
        let mut statistics = RunStatistics::default();

        info!(
            "Starting {} run over {} reference sequences",
            if self.config.count_only { "count-only" } else { "conversion" },
            source.header().n_references()
        );

        let reason = match (self.config.count_only, sink) {
            (false, None) => return Err(ConfigError::MissingSink.into()),
            (true, sink) => {
                let result = converter.run(source, Destination::Count, &options, &mut statistics);
                if let Some(sink) = sink {
                    sink.close()?;
                }
                result?
            }
            (false, Some(sink)) => {
                let result = converter.run(
                    source,
                    Destination::Sink(&mut *sink),
                    &options,
                    &mut statistics,
                );
                let closed = sink.close();
                let reason = result?;
                closed?;
                reason
            }
        };

        Ok(RunReport {
            statistics,
            reason,
            timings: converter.timings(),
        })
    }
}
