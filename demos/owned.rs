use tabp::EvaluationContext;

fn main() {
    let program = vec![
        "(DEFUN SPAM () (MUL EGGS 3))",
        "(SPAM)",
        "(DEFVAR EGGS 20)",
        "(SPAM)",
        "(PRINTF \"%d eggs, %s\\n\" EGGS (IF (GT (SPAM) 50) \"plenty\" \"not enough\"))",
    ];

    let mut context = EvaluationContext::new();
    for source in program {
        println!("{}: {}", source, context.evaluate_str(source));
    }
}
