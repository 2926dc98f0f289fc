#![no_main]
use libfuzzer_sys::fuzz_target;

use ttcn_ast::ast::FunctionDef;
use ttcn_lower::{compile_function, LoweringOptions};
use ttcn_runtime::{execute, DriverLimits, ScriptedEnvironment};

fuzz_target!(|data: &[u8]| {
    let Ok(mut def) = serde_json::from_slice::<FunctionDef>(data) else {
        return;
    };
    if !ttcn_ast::check_function(&mut def).is_ok() {
        return;
    }
    let options = LoweringOptions::default();
    if let Ok(machine) = compile_function(&def, &options) {
        let mut env = ScriptedEnvironment::new().max_blocking_snapshots(8);
        let _ = execute(&machine, &mut env, &DriverLimits::with_max_steps(10_000));
    }
});
