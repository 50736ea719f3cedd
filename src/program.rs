use crate::{
    config::MemoryLocation,
    error::DecodeError,
    inst::{ArgRole, CodeId, InputCodeModel, Label, Pc},
};
use hashbrown::HashMap;
use std::str::FromStr;

/// Bytes per instruction slot. Instruction `i` lives at `i * INST_BYTES`.
pub const INST_BYTES: u32 = 4;

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub insts: Vec<InputCodeModel>,
    pub labels: HashMap<Label, Pc>,
    /// Addresses of named data locations.
    pub symbols: HashMap<Label, u32>,
}

impl FromStr for Program {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Program::assemble(s, &[])
    }
}

impl Program {
    /// Assemble `src`, letting immediates refer to the named `data` locations.
    pub fn assemble(src: &str, data: &[MemoryLocation]) -> Result<Self, DecodeError> {
        let mut insts = Vec::default();
        let mut labels = HashMap::new();
        let symbols = data
            .iter()
            .map(|loc| (Label(loc.name.clone()), loc.address))
            .collect::<HashMap<_, _>>();

        for (i, line) in src.lines().enumerate() {
            // Line numbers start at 1
            let i = i + 1;

            // Strip comments and empty lines
            let mut line = line
                .find(|c| c == '#' || c == ';')
                .map_or(line, |end| &line[..end])
                .trim();

            // Any number of labels may precede an instruction.
            while let Some((name, rest)) = line.split_once(':') {
                let name = name.trim();
                let label = Label::from_str(name).map_err(|reason| {
                    DecodeError::MalformedOperand {
                        line: i,
                        operand: name.to_owned(),
                        reason,
                    }
                })?;

                let pc = Pc::try_from(insts.len())
                    .unwrap_or(Pc::MAX)
                    .saturating_mul(INST_BYTES);
                if symbols.contains_key(&label) || labels.insert(label, pc).is_some() {
                    return Err(DecodeError::DuplicateLabel {
                        line: i,
                        label: name.to_owned(),
                    });
                }

                line = rest.trim();
            }

            // Assembler directives carry nothing we simulate.
            if line.is_empty() || line.starts_with('.') {
                continue;
            }

            insts.push(InputCodeModel::decode(line, CodeId(insts.len()), i)?);
        }

        // Do another pass to fixup the labels. Only code labels are branch targets.
        let insts = insts
            .into_iter()
            .map(|inst| {
                let line = inst.source_line;
                inst.resolve_labels(|role, label| match role {
                    ArgRole::Target => labels.get(label).copied(),
                    _ => labels.get(label).or_else(|| symbols.get(label)).copied(),
                })
                .map_err(|missing| DecodeError::UndefinedLabel {
                    line,
                    label: missing.0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Program {
            insts,
            labels,
            symbols,
        })
    }

    pub fn fetch(&self, pc: Pc) -> Option<&InputCodeModel> {
        if pc % INST_BYTES != 0 {
            return None;
        }

        self.insts.get(usize::try_from(pc / INST_BYTES).ok()?)
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Source line of the instruction at `pc`.
    pub fn source_line(&self, pc: Pc) -> Option<usize> {
        self.fetch(pc).map(|inst| inst.source_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::Mnemonic;

    #[test]
    fn test_labels_and_comments() {
        let prog = "
            .text
            start:  li a0, 1   # comment
            ; full line comment
            loop: addi a0, a0, -1
                  bnez a0, loop
            end:
        "
        .parse::<Program>()
        .unwrap();

        assert_eq!(prog.len(), 3);
        assert_eq!(prog.labels[&Label("start".to_owned())], 0);
        assert_eq!(prog.labels[&Label("loop".to_owned())], 4);
        assert_eq!(prog.labels[&Label("end".to_owned())], 12);
        assert_eq!(prog.fetch(8).map(|i| i.target()), Some(Some(4)));
        assert_eq!(prog.fetch(8).map(|i| i.mnemonic), Some(Mnemonic::Bnez));
        assert_eq!(prog.source_line(4), Some(5));
        assert!(prog.fetch(2).is_none());
        assert!(prog.fetch(12).is_none());
    }

    #[test]
    fn test_data_symbols() {
        use crate::config::{DataKind, MemoryLocation};

        let data = [MemoryLocation::new("table", 0x400, DataKind::Word, &[1, 2])];
        let prog = Program::assemble("li a0, table\nstart: addi a1, zero, start", &data).unwrap();

        assert_eq!(prog.insts[0].imm(), 0x400);
        assert_eq!(prog.insts[1].imm(), 4);
        assert_eq!(prog.symbols[&Label("table".to_owned())], 0x400);

        assert_eq!(
            Program::assemble("beqz a0, table", &data).unwrap_err(),
            DecodeError::UndefinedLabel {
                line: 1,
                label: "table".to_owned()
            }
        );
        assert!(matches!(
            Program::assemble("nop\ntable: nop", &data),
            Err(DecodeError::DuplicateLabel { line: 2, .. })
        ));
    }

    #[test]
    fn test_label_errors() {
        assert_eq!(
            "j nowhere".parse::<Program>().unwrap_err(),
            DecodeError::UndefinedLabel {
                line: 1,
                label: "nowhere".to_owned()
            }
        );

        assert_eq!(
            "a: nop\na: nop".parse::<Program>().unwrap_err(),
            DecodeError::DuplicateLabel {
                line: 2,
                label: "a".to_owned()
            }
        );

        assert!(matches!(
            "bad label: nop".parse::<Program>(),
            Err(DecodeError::MalformedOperand { line: 1, .. })
        ));
    }
}
