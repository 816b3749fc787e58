use crate::{
    codegen::rust::Generator,
    parser,
    util::fmt::{tree, Context, Show},
};

pub const FILENAME: &str = "input.x";

/// Each variant contains the input.
pub enum Test {
    Parser(&'static str),
    Codegen(&'static str),
}

pub enum Assertion {
    OutputOk(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

/// Runs the pipeline, returning the printed output (a tree or generated
/// code) and the formatted errors.
#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let (Test::Parser(src) | Test::Codegen(src)) = test;
    let ctx = Context {
        filename: FILENAME,
        src,
    };
    let spec = match parser::parse_specification(src) {
        Ok(spec) => spec,
        Err(error) => return (String::new(), vec![format!("{:#}", error.display(&ctx))]),
    };
    match test {
        Test::Parser(_) => (tree::print_specification_string(&spec), vec![]),
        Test::Codegen(_) => match Generator::new(&spec).generate_string() {
            Ok(code) => (code, vec![]),
            Err(error) => (String::new(), vec![error.to_string()]),
        },
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_output: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::OutputOk(expected_output) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(
                formatted_actual_output.trim(),
                expected_output.trim()
            );
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let spec = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind), ::indoc::indoc! { $source });
                let (formatted_actual_output, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_output, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::OutputOk(::indoc::indoc! { $expected })
    };
    (@@assertion, rust_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::OutputOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser), $source:expr) => {
        crate::util::test_utils::Test::Parser($source)
    };
    (@@get_test(codegen), $source:expr) => {
        crate::util::test_utils::Test::Codegen($source)
    };
}
pub(crate) use tree_tests;
