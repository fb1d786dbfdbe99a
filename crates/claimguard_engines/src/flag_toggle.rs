#![forbid(unsafe_code)]

use claimguard_kernel_contracts::Tristate;

/// Next value for a "flip this flag" request. A strict 3-cycle:
/// TRUE -> FALSE -> UNDEFINED -> TRUE. FALSE never returns to TRUE directly.
pub fn next_toggle_value(current: Tristate) -> Tristate {
    match current {
        Tristate::True => Tristate::False,
        Tristate::Undefined => Tristate::True,
        Tristate::False => Tristate::Undefined,
    }
}
