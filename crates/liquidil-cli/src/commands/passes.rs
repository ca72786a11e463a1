//! `liquidil passes`: list the optimizer's numbered passes and whether
//! the active `LIQUIDIL_PASSES` spec (or an explicit override) enables
//! each one.

use liquidil_compiler::optimize::PassSet;

const NAMES: &[(u32, &str)] = &[
    (0, "inline simple partials (no-op: names resolve at render time)"),
    (1, "fold constant comparisons/negation"),
    (2, "fold constant filter calls (no-op: needs the filter table)"),
    (3, "fold constant writes"),
    (4, "collapse constant paths (no-op)"),
    (5, "collapse find+path (no-op)"),
    (6, "remove redundant truthiness checks (no-op)"),
    (7, "remove nop"),
    (8, "remove jump-to-next"),
    (9, "merge adjacent raw writes"),
    (10, "remove unreachable code"),
    (11, "merge adjacent raw writes (second pass)"),
    (12, "fold constant captures (no-op)"),
    (13, "remove empty writes"),
    (14, "constant propagation (no-op)"),
    (15, "filter refolding (no-op)"),
    (16, "loop invariant hoisting (no-op)"),
    (17, "lookup caching (no-op)"),
    (18, "value numbering (no-op)"),
    (19, "register allocation (no-op)"),
    (20, "write-var fusion (no-op)"),
    (21, "strip labels (subsumed by the linker)"),
    (22, "remove interrupt checks in break/continue-free loops (no-op)"),
];

pub fn run() {
    let passes = PassSet::from_env();
    for &(n, desc) in NAMES {
        let marker = if passes.is_enabled(n) { "on " } else { "off" };
        println!("{n:>2} [{marker}] {desc}");
    }
}
