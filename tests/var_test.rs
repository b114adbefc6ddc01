use cism::control::{simulate, StopReason};
use cism::translator::translate;

use slog::{o, Discard, Logger};

#[test]
fn test_var_declarations_are_loaded_and_printed() {
    let program =
        translate(include_str!("var_test.asm")).expect("could not translate var_test.asm");

    // Vector cell first, then the declared words in order.
    assert_eq!(program.data, vec![0, 65, 66, 67]);

    let summary =
        simulate(&program, Vec::new(), Logger::root(Discard, o!())).expect("simulation failed");

    assert_eq!(summary.output, "ABC");
    assert_eq!(summary.instr_counter, 6);
    assert_eq!(summary.ticks, 6);
    assert_eq!(summary.stop, StopReason::Halt);
}
