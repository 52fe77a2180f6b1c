use std::io::Cursor;

use tessera_core::core::error::TraceError;
use tessera_core::isa::opcode::OpCode;
use tessera_core::isa::trace::{Operand, ParsedInstruction, TextTraceReader, TraceReader};

fn parse_all(text: &str) -> Vec<ParsedInstruction> {
    let mut reader = TextTraceReader::new("test", Cursor::new(text.to_string()));
    let mut out = Vec::new();
    while let Some(instruction) = reader.next_instruction().expect("parse failed") {
        out.push(instruction);
    }
    out
}

fn parse_one(line: &str) -> ParsedInstruction {
    let mut parsed = parse_all(line);
    assert_eq!(parsed.len(), 1, "expected one instruction from `{line}`");
    parsed.remove(0)
}

fn parse_err(line: &str) -> TraceError {
    let mut reader = TextTraceReader::new("test", Cursor::new(line.to_string()));
    reader
        .next_instruction()
        .expect_err(&format!("`{line}` should not parse"))
}

#[test]
fn parses_vector_load_with_term() {
    let parsed = parse_one("load r12: ct0_limb3");
    assert_eq!(parsed.opcode, OpCode::LoadV);
    assert_eq!(parsed.dests, vec![Operand::Vector { id: 12, dead: false }]);
    assert_eq!(
        parsed.srcs,
        vec![Operand::Term {
            name: "ct0_limb3".to_string(),
            free_from_mem: false,
        }]
    );
    assert_eq!(parsed.limb, None);
}

#[test]
fn parses_free_from_mem_marker() {
    let parsed = parse_one("load r0: tmp_kv{F}");
    assert_eq!(
        parsed.srcs,
        vec![Operand::Term {
            name: "tmp_kv".to_string(),
            free_from_mem: true,
        }]
    );
}

#[test]
fn parses_scalar_load() {
    let parsed = parse_one("loas s3: scale0");
    assert_eq!(parsed.opcode, OpCode::LoadS);
    assert_eq!(parsed.dests, vec![Operand::Scalar { id: 3, dead: false }]);
}

#[test]
fn scalar_load_requires_scalar_destination() {
    assert!(matches!(parse_err("loas r3: scale0"), TraceError::Malformed { .. }));
}

#[test]
fn parses_binary_op_with_dead_markers() {
    let parsed = parse_one("add r5: r1[X], r2 | 7");
    assert_eq!(parsed.opcode, OpCode::Add);
    assert_eq!(parsed.limb, Some(7));
    assert_eq!(parsed.dests, vec![Operand::Vector { id: 5, dead: false }]);
    assert_eq!(
        parsed.srcs,
        vec![
            Operand::Vector { id: 1, dead: true },
            Operand::Vector { id: 2, dead: false },
        ]
    );
}

#[test]
fn canonicalizes_aliases() {
    assert_eq!(parse_one("ads r1: r2, s0 | 0").opcode, OpCode::Add);
    assert_eq!(parse_one("sus r1: r2, s0 | 0").opcode, OpCode::Sub);
    assert_eq!(parse_one("mup r1: r2, r3 | 0").opcode, OpCode::Mul);
    assert_eq!(parse_one("mus r1: r2, s0 | 0").opcode, OpCode::Mul);
}

#[test]
fn parses_rot_with_index() {
    let parsed = parse_one("rot 768 r4: r9[X] | 2");
    assert_eq!(parsed.opcode, OpCode::Rot);
    assert_eq!(parsed.rot_index, Some(768));
    assert_eq!(parsed.srcs, vec![Operand::Vector { id: 9, dead: true }]);
}

#[test]
fn parses_bcu_operands() {
    let parsed = parse_one("ntt r1: b0{3} | 4");
    assert_eq!(
        parsed.srcs,
        vec![Operand::BcuRef {
            bcu_id: 0,
            slot: Some(3),
        }]
    );
    let parsed = parse_one("sud r1: r2, B5 | 0");
    assert_eq!(parsed.srcs[1], Operand::BcuRef { bcu_id: 5, slot: None });
}

#[test]
fn bci_counts_bases() {
    let parsed = parse_one("bci b2: [B1, B2] [B3, B4, B5]");
    assert_eq!(parsed.opcode, OpCode::Bci);
    assert_eq!(
        parsed.dests,
        vec![Operand::BcuInit {
            bcu_id: 2,
            num_writes: 3,
            num_reads: 2,
        }]
    );
}

#[test]
fn parses_rsi_rsv_mod() {
    let rsi = parse_one("rsi {r0, r1, r2}");
    assert_eq!(rsi.opcode, OpCode::Rsi);
    assert_eq!(rsi.dests.len(), 3);
    assert!(rsi.srcs.is_empty());

    let rsv = parse_one("rsv {r0, r1}: r7: [q0, q1] | 3");
    assert_eq!(rsv.opcode, OpCode::Rsv);
    assert_eq!(rsv.dests.len(), 2);
    assert_eq!(rsv.srcs, vec![Operand::Vector { id: 7, dead: false }]);
    assert_eq!(rsv.limb, Some(3));

    let modsw = parse_one("mod r9: {r1, r2[X], r3} | 11");
    assert_eq!(modsw.opcode, OpCode::Mod);
    assert_eq!(modsw.dests, vec![Operand::Vector { id: 9, dead: false }]);
    assert_eq!(modsw.srcs.len(), 3);
    assert_eq!(modsw.srcs[1], Operand::Vector { id: 2, dead: true });
}

#[test]
fn parses_collectives() {
    let rcv = parse_one("rcv @ 7:2 r1:");
    assert_eq!(rcv.opcode, OpCode::Rcv);
    assert_eq!((rcv.sync_id, rcv.sync_size), (Some(7), Some(2)));
    assert_eq!(rcv.dests.len(), 1);
    assert!(rcv.srcs.is_empty());

    let dis = parse_one("dis @ 7:2 : r0[X]");
    assert_eq!(dis.opcode, OpCode::Dis);
    assert!(dis.dests.is_empty());
    assert_eq!(dis.srcs, vec![Operand::Vector { id: 0, dead: true }]);

    let joi_src = parse_one("joi @ 9:4 : r0 | 5");
    assert!(joi_src.dests.is_empty());
    assert_eq!(joi_src.srcs.len(), 1);
    assert_eq!(joi_src.limb, Some(5));

    let joi_dest = parse_one("joi @ 9:4 r3: | 5");
    assert_eq!(joi_dest.dests.len(), 1);
    assert!(joi_dest.srcs.is_empty());
}

#[test]
fn skips_blank_lines() {
    let parsed = parse_all("load r0: a\n\n\nload r1: b\n");
    assert_eq!(parsed.len(), 2);
}

#[test]
fn rejects_unknown_opcode() {
    assert!(matches!(parse_err("frob r0: r1 | 0"), TraceError::UnknownOpcode { .. }));
}

#[test]
fn rejects_disabled_keyswitch_phases() {
    for line in ["pl2 b0, r1: b1{0}, r2 | 0", "pl3 b0: r1, r2 | 0", "pl4 r0: b1{0}, r2, r3 | 0"] {
        assert!(matches!(parse_err(line), TraceError::UnsupportedOpcode { .. }));
    }
}

#[test]
fn reports_line_numbers() {
    let mut reader = TextTraceReader::new(
        "test",
        Cursor::new("load r0: a\nbogus instruction here\n".to_string()),
    );
    reader.next_instruction().unwrap();
    match reader.next_instruction().unwrap_err() {
        TraceError::UnknownOpcode { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn canonical_emission_round_trips() {
    let lines = [
        "load r0: ct0",
        "load r1: ct1{F}",
        "loas s0: scale",
        "store r3: out0",
        "spill r4[X]: tmp1",
        "evg r5: key0 | 3",
        "add r2: r0, r1[X] | 0",
        "sub r2: r0, s1 | 1",
        "mul r6: r2, r0 | 2",
        "neg r7: r6[X] | 2",
        "rot 31 r8: r7 | 0",
        "con r9: r8 | 0",
        "ntt r1: r0 | 4",
        "ntt r1: b0{2} | 4",
        "int r2: r1 | 4",
        "sud r3: r1, B2 | 5",
        "mov r4: r3",
        "pl1 b1: r2 | 6",
        "bcw b1: r2 | 7",
        "bci b0: [B0, B1, B2] [B0, B1]",
        "rsi {r10, r11}",
        "rsv {r10, r11}: r2: [] | 0",
        "mod r12: {r10, r11} | 1",
        "rcv @ 3:2 r1:",
        "dis @ 3:2 : r0",
        "joi @ 4:4 r1: | 2",
        "joi @ 4:4 : r0[X] | 2",
    ];
    for line in lines {
        let first = parse_one(line);
        let emitted = first.to_string();
        let second = parse_one(&emitted);
        assert_eq!(first, second, "round trip failed for `{line}` via `{emitted}`");
    }
}
