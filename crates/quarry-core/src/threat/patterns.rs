use crate::types::Severity;

/// Tier tables, highest severity first. Patterns are matched against
/// lowercased input.
pub(crate) const TIERS: &[(Severity, &[&str])] = &[
    (Severity::Critical, CRITICAL),
    (Severity::High, HIGH),
    (Severity::Medium, MEDIUM),
    (Severity::Low, LOW),
];

const CRITICAL: &[&str] = &[
    r"ignore\s+(previous|prior|all)\s+instructions?",
    r"forget\s+(everything|all|previous)",
    r"you\s+are\s+now\s+(a|an)\s+\w+",
    r"pretend\s+to\s+be",
    r"act\s+as\s+(if|though)",
    r"roleplay\s+as",
    r"system\s*:",
    r"assistant\s*:",
    r"user\s*:",
    r"execute\s+(code|command|script)",
    r"run\s+(code|command|script)",
    r"access\s+(files?|system|database)",
    r"reveal\s+(secrets?|password|key)",
    r"show\s+me\s+your\s+(prompt|instructions?)",
    r"what\s+are\s+your\s+(instructions?|prompts?)",
    r"jailbreak",
    r"bypass\s+(security|protection|safety)",
    r"override\s+(system|safety|protection)",
    r"hack\s+(into|the\s+system)",
    r"exploit\s+(vulnerability|bug)",
];

const HIGH: &[&str] = &[
    r"ignore\s+instructions?",
    r"disregard\s+(previous|prior)",
    r"change\s+(your|the)\s+(role|behavior)",
    r"become\s+(a|an)\s+\w+",
    r"simulate\s+(being|as)",
    r"imitate\s+(a|an)\s+\w+",
    r"masquerade\s+as",
    r"impersonate\s+(a|an)\s+\w+",
    r"break\s+(out|free)",
    r"escape\s+(from|the)",
    r"unlock\s+(yourself|the\s+system)",
    r"remove\s+(restrictions?|limitations?)",
    r"disable\s+(safety|security|protection)",
    r"turn\s+off\s+(safety|security)",
];

const MEDIUM: &[&str] = &[
    r"what\s+if\s+(you|we)\s+(were|could)",
    r"hypothetically\s+(speaking|if)",
    r"imagine\s+(if|that)",
    r"suppose\s+(you|we)\s+(were|could)",
    r"let's\s+(pretend|say)\s+(that|you)",
    r"assume\s+(you|we)\s+(are|could)",
    r"in\s+(a|an)\s+(alternate|different)\s+(reality|universe)",
    r"if\s+(you|we)\s+(were|could)\s+(a|an)",
];

const LOW: &[&str] = &[
    r"please\s+(ignore|forget)",
    r"can\s+you\s+(ignore|forget)",
    r"would\s+you\s+(ignore|forget)",
    r"try\s+to\s+(ignore|forget)",
    r"attempt\s+to\s+(ignore|forget)",
];

/// Credential and system-access vocabulary. Hits add tags but never raise
/// severity above "low".
pub(crate) const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "admin",
    "root",
    "password",
    "secret",
    "key",
    "token",
    "api_key",
    "database",
    "server",
    "config",
    "settings",
    "environment",
    "shell",
    "terminal",
    "command",
    "script",
    "exec",
    "eval",
    "inject",
    "payload",
    "exploit",
    "vulnerability",
    "backdoor",
    "malware",
    "virus",
    "trojan",
    "worm",
    "ransomware",
];
