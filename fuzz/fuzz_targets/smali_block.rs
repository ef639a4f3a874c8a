#![no_main]

use dexweave::{
    assembly::{parse_block, RegisterFile},
    metadata::{AccessFlags, MethodBuilder},
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(block) = parse_block(text) {
        let file = RegisterFile {
            register_count: 16,
            parameter_registers: 2,
        };
        let _ = block.compile(&file);
    }

    // Whatever the editor accepts must leave a body it can edit again.
    let Ok(mut method) = MethodBuilder::new("run")
        .access(AccessFlags::STATIC)
        .parameters(["I", "Ljava/lang/Object;"])
        .registers(8)
        .body("const/4 v0, 0x0\nif-eqz p0, :end\nnop\n:end\nreturn-void")
        .build("Lfuzz/Target;")
    else {
        return;
    };
    if let Ok(mut editor) = method.editor() {
        if editor.add_instructions_at_control_flow_label(3, text).is_ok() {
            let end = editor.len() - 1;
            let _ = editor.add_instructions(end, "nop");
        }
    }
});
