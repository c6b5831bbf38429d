//! Scenarios for live queries, each a module under [valid](./valid/mod.rs)
//! exposing a `test` function.

macro_rules! valid_tests {
    ( $($section:ident { $($test:ident),+ } ),+ ) => {
        mod valid;
        $(
            mod $section {
                $(
                    #[test]
                    fn $test() {
                        super::valid::init_logging();
                        super::valid::$section::$test::test();
                    }
                )+
            }
        )+
    };
}

valid_tests!(
    compile {
        unresolved_alias,
        identity_sharing,
        invalid_aggregate,
        join_order
    },
    scenarios {
        join_filter,
        group_update,
        aggregate_retraction,
        correlated_subquery,
        window
    },
    lifecycle {
        disposal,
        no_miss,
        late_subscriber,
        reentrant_writes,
        field_errors
    }
);
