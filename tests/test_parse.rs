use hashbrown::HashMap;
use superscalar::{
    error::DecodeError,
    inst::{Label, Mnemonic, Operand},
    program::Program,
};

#[test]
fn parse_all() {
    for entry in std::fs::read_dir("asm").unwrap() {
        let entry = entry.unwrap();
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        let prog_name = entry.file_name().to_str().unwrap().to_owned();

        println!("parsing {prog_name}...");
        let prog = contents
            .parse::<Program>()
            .unwrap_or_else(|e| panic!("failed to parse program {prog_name}: {e}"));
        assert!(!prog.is_empty(), "{prog_name} has no instructions");
    }
}

#[test]
fn check_labels() {
    let contents = std::fs::read_to_string("asm/label.asm").unwrap();
    let prog = contents
        .parse::<Program>()
        .expect("failed to parse asm/label.asm");

    let mut test = HashMap::new();
    test.insert(Label("foo".to_owned()), 4);
    test.insert(Label(".bar".to_owned()), 12);
    test.insert(Label("baz5".to_owned()), 16);
    test.insert(Label("end".to_owned()), 24);
    assert_eq!(prog.labels, test);

    let jump = prog.fetch(4).unwrap();
    assert_eq!(jump.mnemonic, Mnemonic::J);
    assert_eq!(jump.target(), Some(12));
    assert!(matches!(
        &jump.args[0].operand,
        Operand::Target { name, pc: 12 } if name.0 == ".bar"
    ));
}

#[test]
fn check_source_lines() {
    let prog = "# header\n\nstart: addi a0, a0, 1 ; trailing\n  bnez a0, start\n"
        .parse::<Program>()
        .unwrap();

    assert_eq!(prog.len(), 2);
    assert_eq!(prog.source_line(0), Some(3));
    assert_eq!(prog.source_line(4), Some(4));
    assert_eq!(prog.source_line(2), None);
    assert_eq!(prog.fetch(4).unwrap().target(), Some(0));
}

#[test]
fn check_decode_errors() {
    let err = "nop\nfrobnicate a0, a1".parse::<Program>().unwrap_err();
    assert_eq!(
        err,
        DecodeError::UnsupportedMnemonic {
            line: 2,
            mnemonic: "frobnicate".to_owned()
        }
    );

    let err = "j nowhere".parse::<Program>().unwrap_err();
    assert!(matches!(
        err,
        DecodeError::UndefinedLabel { line: 1, ref label } if label == "nowhere"
    ));

    let err = "a:\na: nop".parse::<Program>().unwrap_err();
    assert!(matches!(err, DecodeError::DuplicateLabel { line: 2, .. }));

    for bad in ["add a0, a1", "addi a0, a1, 1x", "lw a0, 4(q9)", "add a0, a1, a2, a3"] {
        assert!(
            matches!(bad.parse::<Program>(), Err(DecodeError::MalformedOperand { line: 1, .. })),
            "{bad} should not decode"
        );
    }
}
