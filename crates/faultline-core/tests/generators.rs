use faultline_core::model::notice::{Frame, Notice, Params};
use proptest::prelude::*;
use serde_json::Value;

pub fn arb_path() -> impl Strategy<Value = String> + Clone {
    prop_oneof![
        "\\[PROJECT_ROOT\\]/app/[a-z_]{1,12}\\.rb",
        "\\[GEM_ROOT\\]/gems/[a-z]{1,8}-[0-9]\\.[0-9]/lib/[a-z_]{1,10}\\.rb",
        "On line #[0-9]{1,3} of app/views/[a-z]{1,8}\\.erb",
        "[0-9]{1,3}:in [a-z]{1,6}",
        "lib/[a-zé/]{1,40}\\.rb",
        Just(String::new()),
    ]
}

pub fn arb_frame() -> impl Strategy<Value = Frame> + Clone {
    (arb_path(), any::<u32>(), "[a-z_]{0,10}")
        .prop_map(|(file, line, method)| Frame::new(file, line, method))
}

pub fn arb_backtrace() -> impl Strategy<Value = Vec<Frame>> + Clone {
    prop::collection::vec(arb_frame(), 0..20)
}

pub fn arb_params() -> impl Strategy<Value = Params> + Clone {
    prop::collection::btree_map("[a-z_]{1,8}", "[ -~]{0,16}", 0..4).prop_map(|map| {
        map.into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    })
}

pub fn arb_notice() -> impl Strategy<Value = Notice> + Clone {
    (
        "[A-Z][A-Za-z:]{0,30}",
        "[ -~]{0,40}",
        arb_backtrace(),
        arb_params(),
        arb_params(),
        arb_params(),
        "[a-z]{0,10}",
    )
        .prop_map(
            |(error_class, error_message, backtrace, request, session, environment, env_name)| {
                Notice {
                    error_class,
                    error_message,
                    backtrace,
                    request,
                    session,
                    environment,
                    environment_name: env_name,
                    ..Notice::default()
                }
            },
        )
}
