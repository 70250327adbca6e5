//! End-to-end: listing text in, Intel HEX file out.

use picobit_asm::asm::{assemble, assemble_with_stats};
use picobit_asm::parse::parse_ast;

#[test]
fn listing_to_hex_file() {
    let src = "\
; toplevel loop
main:
    entry 0
    push-constant \"hi\"
    push-global display
    call 1
    goto main
";
    let code = parse_ast(src).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.hex");
    let (written, stats) = assemble_with_stats(&code, &path).unwrap();
    assert_eq!(written, path);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, [
        // header, then "hi" at 261, (104 105) at 262, (105) at 263
        ":10800000FBD7030181064000806C0107806D0002F0",
        // Code starts after the 16-byte header/constant prefix, so `main:`
        // binds to 0x8010. entry 0, push-constant 261, push-global 0 and
        // call 1 put the goto at 0x8015; its rel-8 distance byte is
        // 128 + (0x8010 - 0x8017) = 0x79.
        ":0780100000A1054061B779F2",
        ":00000001FF",
    ]);

    assert!(stats.iter().any(|(name, count)| name == "goto" && count == 1));
}

#[test]
fn assembly_failures_leave_no_file() {
    let code = parse_ast("push-stack 32\n").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.hex");
    assert!(assemble(&code, &path).is_err());
    assert!(!path.exists());
}
