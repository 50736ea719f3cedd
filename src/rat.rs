use crate::{
    error::ResourceStall,
    inst::{ArchReg, ArgRole, InputCodeModel, Operand, PhysReg},
    model::{Binding, RenamedArgument},
};
use std::collections::VecDeque;
use strum::EnumCount;

/// Speculative and committed alias tables plus the free list.
///
/// Architectural register `i` starts mapped to physical register `i`; the
/// remaining physical registers start free.
#[derive(Debug, Clone)]
pub struct RegisterAliasTable {
    speculative: [PhysReg; ArchReg::COUNT],
    committed: [PhysReg; ArchReg::COUNT],
    free: VecDeque<PhysReg>,
}

impl RegisterAliasTable {
    pub fn new(phys_regs: usize) -> Self {
        let identity = std::array::from_fn(|i| PhysReg(i as u16));

        Self {
            speculative: identity,
            committed: identity,
            free: (ArchReg::COUNT..phys_regs)
                .map(|i| PhysReg(i as u16))
                .collect(),
        }
    }

    pub fn get(&self, reg: ArchReg) -> PhysReg {
        self.speculative[reg.index()]
    }

    pub fn get_committed(&self, reg: ArchReg) -> PhysReg {
        self.committed[reg.index()]
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn free_list(&self) -> impl Iterator<Item = PhysReg> + '_ {
        self.free.iter().copied()
    }

    /// Bind every operand of `code`. Sources resolve against the mapping in
    /// effect before the destination is renamed. Nothing changes on failure.
    pub fn rename(&mut self, code: &InputCodeModel) -> Result<Vec<RenamedArgument>, ResourceStall> {
        let needs_reg = code.dest().map_or(false, |rd| rd != ArchReg::Zero);
        if needs_reg && self.free.is_empty() {
            return Err(ResourceStall::PhysicalRegisterExhausted);
        }

        let source = |reg: ArchReg| match reg {
            ArchReg::Zero => None,
            reg => Some(self.get(reg)),
        };

        let mut renamed = Vec::with_capacity(code.args.len());
        let mut dest = None;

        for arg in &code.args {
            let binding = match (&arg.operand, arg.role) {
                (&Operand::Register { reg }, ArgRole::Rd) => {
                    dest = Some(reg);
                    continue;
                }
                (&Operand::Register { reg }, _) => match source(reg) {
                    Some(reg) => Binding::Phys { reg },
                    None => Binding::Zero,
                },
                (&Operand::Immediate { value }, _) => Binding::Imm { value },
                (&Operand::Memory { offset, base }, _) => Binding::Mem {
                    base: source(base),
                    offset,
                },
                (&Operand::Target { pc, .. }, _) => Binding::Target { pc },
                // Unresolved labels never reach the pipeline.
                (Operand::Label { .. }, _) => Binding::Target { pc: 0 },
            };

            renamed.push(RenamedArgument {
                role: arg.role,
                binding,
            });
        }

        if let Some(arch) = dest {
            let binding = match arch {
                ArchReg::Zero => Binding::Discard,
                arch => {
                    let phys = self
                        .free
                        .pop_front()
                        .ok_or(ResourceStall::PhysicalRegisterExhausted)?;
                    let prev = std::mem::replace(&mut self.speculative[arch.index()], phys);
                    Binding::Dest { arch, phys, prev }
                }
            };

            renamed.insert(
                0,
                RenamedArgument {
                    role: ArgRole::Rd,
                    binding,
                },
            );
        }

        Ok(renamed)
    }

    /// Make a retiring mapping architectural. Returns the register it
    /// replaced, which goes back on the free list.
    pub fn commit(&mut self, arch: ArchReg, phys: PhysReg, prev: PhysReg) -> PhysReg {
        self.committed[arch.index()] = phys;
        self.free.push_back(prev);
        prev
    }

    /// Roll the speculative table back to the committed one, returning the
    /// destinations of squashed instructions (oldest first) to the free list.
    pub fn restore<I>(&mut self, squashed: I)
    where
        I: IntoIterator<Item = PhysReg>,
    {
        self.speculative = self.committed;
        self.free.extend(squashed);
    }

    /// Physical registers currently named by either alias table.
    pub fn is_mapped(&self, phys: PhysReg) -> bool {
        self.speculative.contains(&phys) || self.committed.contains(&phys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::CodeId;

    fn code(s: &str) -> InputCodeModel {
        InputCodeModel::decode(s, CodeId(0), 1).unwrap()
    }

    #[test]
    fn test_rename_chain() {
        let mut rat = RegisterAliasTable::new(34);

        let first = rat.rename(&code("addi a0, a0, 1")).unwrap();
        assert_eq!(
            first,
            vec![
                RenamedArgument {
                    role: ArgRole::Rd,
                    binding: Binding::Dest {
                        arch: ArchReg::A0,
                        phys: PhysReg(32),
                        prev: PhysReg(10)
                    }
                },
                RenamedArgument {
                    role: ArgRole::Rs1,
                    binding: Binding::Phys { reg: PhysReg(10) }
                },
                RenamedArgument {
                    role: ArgRole::Imm,
                    binding: Binding::Imm { value: 1 }
                },
            ]
        );

        let second = rat.rename(&code("sw a0, 4(zero)")).unwrap();
        assert_eq!(second[0].binding, Binding::Phys { reg: PhysReg(32) });
        assert_eq!(
            second[1].binding,
            Binding::Mem {
                base: None,
                offset: 4
            }
        );

        rat.rename(&code("li a1, 3")).unwrap();
        assert_eq!(
            rat.rename(&code("li a2, 3")),
            Err(ResourceStall::PhysicalRegisterExhausted)
        );
        // Writes to x0 need no register.
        assert!(rat.rename(&code("li zero, 3")).is_ok());
        assert_eq!(rat.get(ArchReg::A2), PhysReg(12));
    }

    #[test]
    fn test_commit_and_restore() {
        let mut rat = RegisterAliasTable::new(36);
        let a = rat.rename(&code("li a0, 1")).unwrap();
        let b = rat.rename(&code("li a0, 2")).unwrap();
        assert_eq!(rat.free_count(), 2);

        let Binding::Dest { arch, phys, prev } = a[0].binding else {
            panic!("expected a destination");
        };
        assert_eq!(rat.commit(arch, phys, prev), PhysReg(10));
        assert_eq!(rat.get_committed(ArchReg::A0), PhysReg(32));

        let Binding::Dest { phys: squashed, .. } = b[0].binding else {
            panic!("expected a destination");
        };
        rat.restore([squashed]);
        assert_eq!(rat.get(ArchReg::A0), PhysReg(32));
        assert_eq!(
            rat.free_list().collect::<Vec<_>>(),
            vec![PhysReg(34), PhysReg(35), PhysReg(10), PhysReg(33)]
        );
        assert!(!rat.is_mapped(PhysReg(33)));
    }
}
