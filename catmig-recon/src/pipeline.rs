//! Per-record reconciliation state machine
//!
//! ```text
//! Start -> IdentifierExtracted? -> AuthorityResolved?
//!       -> PerfectMatch | FuzzyPass | FuzzyFail | NoMatch
//!       -> Substituted? -> Routed
//! ```
//!
//! Records are driven one at a time to exactly one [`Outcome`]. Errors are caught
//! at the record boundary, counted, and never stop the run.

use catmig_common::marc::{DecodeFailure, Decoded};
use catmig_common::{Subfield, TaggedField, TaggedRecord};
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::authority::{ExternalRecord, Lookup, ReconciliationSource};
use crate::error::{ReconError, ReconResult};
use crate::identifier::{self, Identifier};
use crate::output::{Outcome, OutputRouter};
use crate::policy::{NoPolicy, PolicyExtension};
use crate::statistics::RunStatistics;
use crate::substitution::{self, ConditionalMove, SubstitutionEngine};
use crate::title::{MatchMode, TitleCheck, TitleVerifier, DEFAULT_MIN_RATIO};

/// Tag of the fuzzy-match classification field
pub const FUZZY_LABEL_TAG: &str = "962";
pub const FUZZY_PASSED: &str = "fuzzy-match-passed";
pub const FUZZY_FAILED: &str = "fuzzy-match-failed";

const PROGRESS_INTERVAL: u64 = 1000;

/// Run-wide matching options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Only exact titles count as matches; others are substituted but flagged
    pub require_perfect_match: bool,
    /// Compare titles at all; when off, any resolved authority record matches
    pub title_check: bool,
    /// Token-sort threshold for a fuzzy pass
    pub min_ratio: u8,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            require_perfect_match: false,
            title_check: true,
            min_ratio: DEFAULT_MIN_RATIO,
        }
    }
}

/// Drives records from decode to routing
pub struct ReconciliationPipeline {
    source: ReconciliationSource,
    verifier: TitleVerifier,
    engine: SubstitutionEngine,
    policy: Box<dyn PolicyExtension>,
    moves: Vec<ConditionalMove>,
    audit: AuditLog,
    router: OutputRouter,
    options: PipelineOptions,
    stats: RunStatistics,
}

impl ReconciliationPipeline {
    pub fn new(
        source: ReconciliationSource,
        engine: SubstitutionEngine,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            verifier: TitleVerifier::new(options.title_check),
            engine,
            policy: Box::new(NoPolicy),
            moves: Vec::new(),
            audit: AuditLog::default(),
            router: OutputRouter::default(),
            options,
            stats: RunStatistics::default(),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn PolicyExtension>) -> Self {
        self.moves = policy.conditional_moves();
        self.policy = policy;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_router(mut self, router: OutputRouter) -> Self {
        self.router = router;
        self
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Drive every item of a record stream, then flush and report
    ///
    /// A read error on the stream itself ends the run after flushing what was
    /// already written.
    pub async fn run<I>(mut self, input: I) -> ReconResult<RunStatistics>
    where
        I: IntoIterator<Item = catmig_common::Result<Decoded>>,
    {
        info!(
            mode = ?self.source.mode(),
            policy = self.policy.name(),
            strategy = %self.engine.rules().strategy(),
            "Starting reconciliation run"
        );
        for item in input {
            match item {
                Ok(decoded) => {
                    self.process(decoded).await;
                }
                Err(e) => {
                    error!(error = %e, "Record source failed, ending run");
                    self.finish();
                    return Err(ReconError::Common(e));
                }
            }
        }
        Ok(self.finish())
    }

    pub async fn process(&mut self, item: Decoded) -> Outcome {
        let outcome = match item {
            Decoded::Record(record) => self.process_record(record).await,
            Decoded::Failure(failure) => self.process_failure(failure),
        };
        if self.stats.processed % PROGRESS_INTERVAL == 0 {
            info!(processed = self.stats.processed, "Progress");
        }
        outcome
    }

    /// Archive an undecodable record's bytes
    pub fn process_failure(&mut self, failure: DecodeFailure) -> Outcome {
        self.stats.processed += 1;
        warn!(reason = %failure.reason, bytes = failure.raw.len(), "Undecodable record");
        if let Err(e) = self.router.bad(&failure.raw) {
            self.record_error(&e);
        }
        self.stats.record_outcome(Outcome::Bad);
        Outcome::Bad
    }

    /// Reconcile one record and route it
    pub async fn process_record(&mut self, mut record: TaggedRecord) -> Outcome {
        self.stats.processed += 1;

        let title = record.title();
        if title.is_none() {
            warn!(record = self.stats.processed, "Record has no title (245 $a)");
            self.stats.missing_titles += 1;
            if let Err(e) = self.router.missing_field(&record) {
                self.record_error(&e);
            }
        }

        let extraction = identifier::extract(&record);
        self.stats.identifier_defects += extraction.defects.len() as u64;
        for note in identifier::secondary_notes(&record) {
            self.audit.cancelled(&note, title.as_deref().unwrap_or_default());
        }

        let outcome = match &extraction.identifier {
            None => {
                debug!("No identifier, leaving record unmodified");
                self.no_match(&mut record)
            }
            Some(id) => match self.lookup(id).await {
                Some(external) => self.reconcile(&mut record, title.as_deref(), id, &external),
                None => self.no_match(&mut record),
            },
        };

        self.policy.execute(&mut record, extraction.identifier.as_ref());
        let online = self.policy.is_online(&record);
        for line in self.policy.analyze_type(&record, outcome.label()) {
            self.audit.material_type(&line);
        }

        if let Err(e) = self.router.route(outcome, online, &record) {
            self.record_error(&e);
        }
        self.stats.record_outcome(outcome);
        outcome
    }

    /// Flush sinks and collect counters from the collaborators
    pub fn finish(&mut self) -> RunStatistics {
        self.audit.finish();
        if let Err(e) = self.router.flush() {
            self.record_error(&e);
        }
        self.stats.failed_lookups = self.source.failed_lookups();
        self.stats.audit_write_failures = self.audit.write_failures();
        self.stats.policy = self.policy.counters().into_iter().collect();
        self.stats.clone()
    }

    async fn lookup(&mut self, id: &Identifier) -> Option<ExternalRecord> {
        match self.source.resolve(id).await {
            Ok(Lookup::Found(external)) => {
                self.audit.authority_record(&external);
                Some(external)
            }
            Ok(Lookup::NotFound) => None,
            Ok(Lookup::Exhausted { last_payload, .. }) => {
                self.audit.bad_response(id.as_str(), &last_payload);
                None
            }
            Err(e) => {
                error!(identifier = %id, error = %e, "Authority lookup failed");
                self.stats.record_errors += 1;
                None
            }
        }
    }

    fn reconcile(
        &mut self,
        record: &mut TaggedRecord,
        title: Option<&str>,
        id: &Identifier,
        external: &ExternalRecord,
    ) -> Outcome {
        let parts = external.title_parts();
        let fuzzy = MatchMode::Fuzzy {
            min_ratio: self.options.min_ratio,
        };
        let mode = if self.options.require_perfect_match {
            MatchMode::Perfect
        } else {
            fuzzy
        };

        let check = self.verifier.verify(title, parts.as_ref(), mode);
        self.audit_title(id, &check);

        if check.is_perfect() {
            debug!(identifier = %id, "Perfect title match");
            return self.substitute(record, external, Outcome::Modified);
        }

        if self.options.require_perfect_match {
            if let Err(e) = self.router.fuzzy_original(record) {
                self.record_error(&e);
            }
            let outcome = self.substitute(record, external, Outcome::FuzzyModified);
            if outcome == Outcome::FuzzyModified {
                let recheck = self.verifier.verify(title, parts.as_ref(), fuzzy);
                self.audit_title(id, &recheck);
                self.label_fuzzy(record, recheck.passed);
            }
            return outcome;
        }

        if check.passed {
            debug!(identifier = %id, score = check.score, "Fuzzy title match");
            let outcome = self.substitute(record, external, Outcome::FuzzyModified);
            if outcome == Outcome::FuzzyModified {
                self.label_fuzzy(record, true);
            }
            return outcome;
        }

        debug!(identifier = %id, score = check.score, "Title below threshold");
        self.no_match(record)
    }

    fn substitute(
        &mut self,
        record: &mut TaggedRecord,
        external: &ExternalRecord,
        outcome: Outcome,
    ) -> Outcome {
        match self.engine.apply(record, external, &self.moves) {
            Ok(report) => {
                for entry in &report.audit {
                    self.audit.field(entry);
                }
                self.stats.merge_substitution(&report);
                outcome
            }
            Err(e) => {
                self.record_error(&e);
                self.no_match(record)
            }
        }
    }

    /// Content preservation and local numbering for records left unmodified
    fn no_match(&mut self, record: &mut TaggedRecord) -> Outcome {
        let tally = substitution::apply_moves(record, &self.moves);
        self.stats.merge_tally(&tally);
        self.policy.set_local_identifier(record);
        Outcome::Unmodified
    }

    fn label_fuzzy(&mut self, record: &mut TaggedRecord, passed: bool) {
        let label = if passed {
            self.stats.fuzzy_passed += 1;
            FUZZY_PASSED
        } else {
            self.stats.fuzzy_failed += 1;
            FUZZY_FAILED
        };
        record.insert_ordered(TaggedField::data(
            FUZZY_LABEL_TAG,
            ['0', '0'],
            vec![Subfield::new('a', label)],
        ));
    }

    fn audit_title(&mut self, id: &Identifier, check: &TitleCheck) {
        if let Some(comparison) = &check.comparison {
            self.audit.title(id.as_str(), comparison);
        }
    }

    fn record_error(&mut self, err: &ReconError) {
        error!(record = self.stats.processed, error = %err, "Record error");
        self.stats.record_errors += 1;
    }
}
