//! Explain registry for reason codes.
//!
//! Maps each reason code to an operator-facing explanation with remediation guidance.

use crate::reason::ReasonCode;

/// Explanation entry for a reason code.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Short description of the code.
    pub title: &'static str,
    /// What triggers the code.
    pub description: &'static str,
    /// How to get signals past it.
    pub remediation: &'static str,
    /// Before/after signal snippets.
    pub examples: ExamplePair,
}

/// Before and after examples.
#[derive(Debug, Clone)]
pub struct ExamplePair {
    /// Signal fragment that triggers the code.
    pub before: &'static str,
    /// Signal fragment that passes.
    pub after: &'static str,
}

/// Look up an explanation by wire code (`SCOPE_NOT_FOUND`) or lowercase alias (`scope_not_found`).
///
/// Returns `None` if the identifier is not recognized.
pub fn lookup_explanation(identifier: &str) -> Option<Explanation> {
    let code = ReasonCode::parse(&identifier.to_ascii_uppercase())?;
    Some(explain(code))
}

/// List all known codes.
pub fn all_codes() -> &'static [ReasonCode] {
    &ReasonCode::ALL
}

pub fn explain(code: ReasonCode) -> Explanation {
    match code {
        ReasonCode::ScopeNotFound => Explanation {
            title: "Scope Not Found",
            description: "\
A target scope is well formed but names an instance that does not exist in the scope
registry, for example a question number above the configured question count.

Gate 1 rejects the whole signal when any single scope is unknown.",
            remediation: "\
Check the producer's scope mapping against the configured ranges:
- questions Q001..Q300
- policy areas PA01..PA10
- dimensions D1..D6
- clusters CL01..CL04",
            examples: ExamplePair {
                before: r#"{"target_scopes": ["Q999"]}"#,
                after: r#"{"target_scopes": ["Q042"]}"#,
            },
        },
        ReasonCode::InvalidScopeFormat => Explanation {
            title: "Invalid Scope Format",
            description: "\
A target scope does not match the fixed format of any scope kind. Each kind has a prefix
and an exact digit width: Q + 3 digits, PA + 2 digits, D + 1 digit, CL + 2 digits.",
            remediation: "\
Emit canonical zero-padded identifiers. `Q42` must be written as `Q042`, `PA2` as `PA02`.",
            examples: ExamplePair {
                before: r#"{"target_scopes": ["Q42", "pa02"]}"#,
                after: r#"{"target_scopes": ["Q042", "PA02"]}"#,
            },
        },
        ReasonCode::ScopeHierarchyViolation => Explanation {
            title: "Scope Hierarchy Violation",
            description: "\
A question scope was sent together with a policy area or dimension that is not its parent.
Every question belongs to exactly one policy area and one dimension.",
            remediation: "\
Either drop the unrelated parent scope or target the parent that owns the question.
Q042 belongs to PA02 and D3.",
            examples: ExamplePair {
                before: r#"{"target_scopes": ["Q042", "PA05"]}"#,
                after: r#"{"target_scopes": ["Q042", "PA02"]}"#,
            },
        },
        ReasonCode::LowValue => Explanation {
            title: "Low Value Add",
            description: "\
The value-add score fell below the configured threshold (0.30 by default, inclusive).
The score combines payload uniqueness against facts already recorded for the target
scopes with payload information density, plus a bonus for fresh signals.",
            remediation: "\
Avoid re-emitting facts that were already delivered for the same scopes, and drop empty
or null payload fields. Enrichment signals bypass this gate; other producers can set
`metadata.bypass_value_gate` when a resend is deliberate.",
            examples: ExamplePair {
                before: r#"{"payload": {"score": null, "notes": ""}}"#,
                after: r#"{"payload": {"score": 0.82, "evidence": ["p.4 table 2"]}}"#,
            },
        },
        ReasonCode::NoCapableConsumer => Explanation {
            title: "No Capable Consumer",
            description: "\
No registered consumer accepts this signal type for its source phase, covers any of
the target scopes, and is currently healthy or degraded.",
            remediation: "\
Register a consumer that declares the signal type and its required capability, or check
the health of the expected consumer. `irrigation catalog` lists each type's legal
phases and capability.",
            examples: ExamplePair {
                before: r#"{"signal_type": "ENRICHMENT_METADATA"}  # no consumer accepts it"#,
                after: r#"[[consumers]]
id = "phase-3"
signal_types = ["ENRICHMENT_METADATA"]
capabilities = ["write_metadata"]"#,
            },
        },
        ReasonCode::ChannelBlocked => Explanation {
            title: "Channel Blocked",
            description: "\
A target consumer's queue is at its high-water mark. The signal is deferred and
retried with backoff; it is dead-lettered only once the retry budget is spent.
Low-priority signals are blocked first.",
            remediation: "\
Raise the consumer's queue capacity or concurrency, or reduce producer burst rate.
High and critical signals spill to a secondary eligible consumer when one exists.",
            examples: ExamplePair {
                before: r#"queue_capacity = 8"#,
                after: r#"queue_capacity = 256
max_concurrent = 8"#,
            },
        },
        ReasonCode::DuplicateSignal => Explanation {
            title: "Duplicate Signal",
            description: "\
An identical signal (same type, scopes and payload hash) was already accepted inside
the deduplication window. The repeat is recorded and dropped; the original is unaffected.",
            remediation: "\
Usually informational. If the resend carries new information, change the payload or
wait until the deduplication window has passed.",
            examples: ExamplePair {
                before: r#"submit(s); submit(s_copy)"#,
                after: r#"submit(s)"#,
            },
        },
        ReasonCode::RateLimited => Explanation {
            title: "Rate Limited",
            description: "\
The global signal rate limit was exceeded. The signal is retried after the time needed
for the limiter to refill.",
            remediation: "\
Raise `channel.rate_limit_per_sec` / `channel.rate_limit_burst`, or smooth the producer.",
            examples: ExamplePair {
                before: r#"rate_limit_per_sec = 10"#,
                after: r#"rate_limit_per_sec = 200
rate_limit_burst = 400"#,
            },
        },
        ReasonCode::AuditFailure => Explanation {
            title: "Audit Write Failure",
            description: "\
The audit record could not be durably written. Dispatch is never authorized without
an audit record, so the signal was stopped and the failure escalated.",
            remediation: "\
Check the ledger directory: free space, permissions, and whether the file system is
read-only. Run `irrigation audit verify` once writes succeed again.",
            examples: ExamplePair {
                before: r#"storage.data_dir = "/read-only/mount""#,
                after: r#"storage.data_dir = "/var/lib/irrigation""#,
            },
        },
        ReasonCode::ConsumerFailure => Explanation {
            title: "Consumer Failure",
            description: "\
A consumer kept rejecting, timing out on, or erroring for its copy of the signal until
its retry budget was exhausted (or its circuit breaker stayed open). Only that
consumer's copy is dead-lettered; sibling consumers are unaffected.",
            remediation: "\
Inspect the consumer's logs and health state. Increase `timeout_ms` or `retry.max_retries`
if failures are transient.",
            examples: ExamplePair {
                before: r#"timeout_ms = 50"#,
                after: r#"timeout_ms = 2000
[consumers.retry]
max_retries = 3"#,
            },
        },
        ReasonCode::Expired => Explanation {
            title: "Signal Expired",
            description: "\
The signal passed its `expires_at` deadline, or was explicitly expired, before delivery
finished. Expired signals are dead-lettered as if they had failed gate 1.",
            remediation: "\
Give long-running stages a longer TTL when building the signal, or investigate why
delivery is slow.",
            examples: ExamplePair {
                before: r#"Signal::builder(t, 4).ttl(Duration::seconds(1))"#,
                after: r#"Signal::builder(t, 4)  # default five minute TTL"#,
            },
        },
    }
}
