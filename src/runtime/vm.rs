use crate::bytecode::{Instruction, Opcode, Operand, Program};
use crate::runtime::runtime_error::RuntimeFault;
use tracing::{debug, trace};

pub const REGISTER_COUNT: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmConfig {
    /// Instructions a single run may execute; `None` is unbounded.
    pub max_steps: Option<u64>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    /// Value reported by RETURN; `None` when the program fell off its end.
    pub value: Option<i64>,
    pub steps: u64,
}

enum Flow {
    Next,
    Jump(usize),
    Halt(i64),
}

pub struct Vm {
    registers: [i64; REGISTER_COUNT],
    flag: bool,
    pc: usize,
    steps: u64,
    config: VmConfig,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
            flag: false,
            pc: 0,
            steps: 0,
            config,
        }
    }

    pub fn registers(&self) -> &[i64] {
        &self.registers
    }

    /// Result of the most recent CMP.
    pub fn flag(&self) -> bool {
        self.flag
    }

    pub fn reset_execution_state(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.flag = false;
        self.pc = 0;
        self.steps = 0;
    }

    /// Runs `program` from address 0 with zeroed registers until RETURN,
    /// the end of the program, or a fault.
    pub fn run(&mut self, program: &Program) -> Result<Execution, RuntimeFault> {
        self.reset_execution_state();

        while let Some(instr) = program.get(self.pc) {
            self.check_limits()?;
            trace!(pc = self.pc, instr = ?instr, "step");

            match self.execute(instr)? {
                Flow::Next => self.pc += 1,
                Flow::Jump(target) => {
                    if target > program.len() {
                        return Err(RuntimeFault::JumpOutOfRange {
                            pc: self.pc,
                            target: target as u32,
                            len: program.len(),
                        });
                    }
                    self.pc = target;
                }
                Flow::Halt(value) => {
                    debug!(value, steps = self.steps, "returned");
                    return Ok(Execution {
                        value: Some(value),
                        steps: self.steps,
                    });
                }
            }
        }

        debug!(steps = self.steps, "fell off end of program");
        Ok(Execution {
            value: None,
            steps: self.steps,
        })
    }

    fn check_limits(&mut self) -> Result<(), RuntimeFault> {
        self.steps += 1;

        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(RuntimeFault::StepLimitExceeded { limit });
            }
        }

        Ok(())
    }

    fn execute(&mut self, instr: &Instruction) -> Result<Flow, RuntimeFault> {
        match *instr {
            Instruction::Set { dest, value } => {
                *self.register_mut(dest)? = i64::from(value);
            }

            Instruction::Add { dest, lhs, rhs } => {
                self.arith(Opcode::Add, dest, lhs, rhs, i64::checked_add)?
            }
            Instruction::Sub { dest, lhs, rhs } => {
                self.arith(Opcode::Sub, dest, lhs, rhs, i64::checked_sub)?
            }
            Instruction::Mul { dest, lhs, rhs } => {
                self.arith(Opcode::Mul, dest, lhs, rhs, i64::checked_mul)?
            }
            Instruction::Div { dest, lhs, rhs } => {
                self.divide(Opcode::Div, dest, lhs, rhs, floor_div)?
            }
            Instruction::Mod { dest, lhs, rhs } => {
                self.divide(Opcode::Mod, dest, lhs, rhs, floor_mod)?
            }

            Instruction::Cmp { lhs, rhs, op } => {
                let a = self.value(lhs)?;
                let b = self.value(rhs)?;
                self.flag = op.test(a, b);
            }

            Instruction::JumpIfFalse { target } => {
                if !self.flag {
                    return Ok(Flow::Jump(target as usize));
                }
            }

            Instruction::Jump { target } => return Ok(Flow::Jump(target as usize)),

            Instruction::Return { src } => return Ok(Flow::Halt(self.register(src)?)),
        }

        Ok(Flow::Next)
    }

    fn arith(
        &mut self,
        opcode: Opcode,
        dest: u32,
        lhs: Operand,
        rhs: Operand,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<(), RuntimeFault> {
        let a = self.value(lhs)?;
        let b = self.value(rhs)?;
        let result = op(a, b).ok_or(RuntimeFault::Overflow {
            pc: self.pc,
            opcode: opcode.mnemonic(),
        })?;
        *self.register_mut(dest)? = result;
        Ok(())
    }

    fn divide(
        &mut self,
        opcode: Opcode,
        dest: u32,
        lhs: Operand,
        rhs: Operand,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<(), RuntimeFault> {
        if self.value(rhs)? == 0 {
            return Err(RuntimeFault::DivisionByZero {
                pc: self.pc,
                opcode: opcode.mnemonic(),
            });
        }
        self.arith(opcode, dest, lhs, rhs, op)
    }

    /// Resolves an operand exactly as it was tagged by the compiler.
    fn value(&self, operand: Operand) -> Result<i64, RuntimeFault> {
        match operand {
            Operand::Literal(n) => Ok(i64::from(n)),
            Operand::Slot(s) => self.register(s),
        }
    }

    fn register(&self, slot: u32) -> Result<i64, RuntimeFault> {
        self.registers
            .get(slot as usize)
            .copied()
            .ok_or(RuntimeFault::RegisterOutOfRange { pc: self.pc, slot })
    }

    fn register_mut(&mut self, slot: u32) -> Result<&mut i64, RuntimeFault> {
        let pc = self.pc;
        self.registers
            .get_mut(slot as usize)
            .ok_or(RuntimeFault::RegisterOutOfRange { pc, slot })
    }
}

/// Integer division rounding toward negative infinity. `None` on a zero
/// divisor or overflow.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder matching [`floor_div`]: `a == b * floor_div(a, b) + floor_mod(a, b)`,
/// and a non-zero result has the sign of `b`.
pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    if b == -1 {
        return Some(0);
    }
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::RelOp;
    use crate::frontend::token::ArithOp;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn slot(n: u32) -> Operand {
        Operand::Slot(n)
    }

    fn lit(n: i32) -> Operand {
        Operand::Literal(n)
    }

    fn run_ops(ops: Vec<Instruction>) -> Result<Execution, RuntimeFault> {
        Vm::new().run(&Program::from(ops))
    }

    fn run_ops_with_config(
        ops: Vec<Instruction>,
        config: VmConfig,
    ) -> Result<Execution, RuntimeFault> {
        Vm::with_config(config).run(&Program::from(ops))
    }

    fn assert_returns(ops: Vec<Instruction>, expected: i64) {
        let execution = run_ops(ops).expect("execution should succeed");
        assert_eq!(execution.value, Some(expected), "return value mismatch");
    }

    fn assert_fault(ops: Vec<Instruction>, error_contains: &str) {
        match run_ops(ops) {
            Ok(execution) => panic!(
                "expected fault containing '{}', got {:?}",
                error_contains, execution
            ),
            Err(e) => assert!(
                e.to_string().contains(error_contains),
                "expected fault containing '{}', got: {}",
                error_contains,
                e
            ),
        }
    }

    fn binary(op: ArithOp, a: i32, b: i32) -> Vec<Instruction> {
        vec![
            Instruction::Set { dest: 0, value: a },
            Instruction::Set { dest: 1, value: b },
            op.instruction(2, slot(0), slot(1)),
            Instruction::Return { src: 2 },
        ]
    }

    // ============================================================
    // Registers and arithmetic
    // ============================================================

    #[test]
    fn test_set_and_return() {
        assert_returns(
            vec![
                Instruction::Set { dest: 7, value: 42 },
                Instruction::Return { src: 7 },
            ],
            42,
        );
    }

    #[test]
    fn test_registers_start_at_zero() {
        assert_returns(vec![Instruction::Return { src: 255 }], 0);
    }

    #[test]
    fn test_add_sub_mul() {
        assert_returns(binary(ArithOp::Add, 5, 7), 12);
        assert_returns(binary(ArithOp::Sub, 10, 3), 7);
        assert_returns(binary(ArithOp::Mul, -4, 6), -24);
    }

    #[test]
    fn test_literal_and_slot_operands_are_not_confused() {
        // r5 holds 100; literal 5 must stay 5.
        assert_returns(
            vec![
                Instruction::Set { dest: 5, value: 100 },
                Instruction::Add {
                    dest: 0,
                    lhs: lit(5),
                    rhs: slot(5),
                },
                Instruction::Return { src: 0 },
            ],
            105,
        );
    }

    #[test]
    fn test_results_exceed_i32() {
        assert_returns(
            vec![
                Instruction::Set {
                    dest: 0,
                    value: i32::MAX,
                },
                Instruction::Mul {
                    dest: 0,
                    lhs: slot(0),
                    rhs: lit(4),
                },
                Instruction::Return { src: 0 },
            ],
            i64::from(i32::MAX) * 4,
        );
    }

    #[test]
    fn test_div_mod_floor_semantics() {
        for a in -20i32..=20 {
            for b in -6i32..=6 {
                if b == 0 {
                    continue;
                }
                let (a64, b64) = (i64::from(a), i64::from(b));
                let q = (a64 as f64 / b64 as f64).floor() as i64;
                let r = a64 - b64 * q;
                assert_returns(binary(ArithOp::Div, a, b), q);
                assert_returns(binary(ArithOp::Mod, a, b), r);
            }
        }
    }

    #[test]
    fn test_floor_helpers() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(-7, -2), Some(3));
        assert_eq!(floor_mod(-7, 2), Some(1));
        assert_eq!(floor_mod(7, -2), Some(-1));
        assert_eq!(floor_mod(-7, -2), Some(-1));
        assert_eq!(floor_div(1, 0), None);
        assert_eq!(floor_mod(1, 0), None);
        assert_eq!(floor_div(i64::MIN, -1), None);
        assert_eq!(floor_mod(i64::MIN, -1), Some(0));
    }

    #[test]
    fn test_div_and_mod_by_zero_fault() {
        for a in [-3, 0, 20] {
            assert_eq!(
                run_ops(binary(ArithOp::Div, a, 0)),
                Err(RuntimeFault::DivisionByZero {
                    pc: 2,
                    opcode: "DIV"
                })
            );
            assert_eq!(
                run_ops(binary(ArithOp::Mod, a, 0)),
                Err(RuntimeFault::DivisionByZero {
                    pc: 2,
                    opcode: "MOD"
                })
            );
        }
    }

    #[test]
    fn test_division_by_literal_zero() {
        assert_fault(
            vec![Instruction::Div {
                dest: 0,
                lhs: lit(1),
                rhs: lit(0),
            }],
            "DIV by zero",
        );
    }

    #[test]
    fn test_overflow_faults() {
        let mut ops = vec![Instruction::Set {
            dest: 0,
            value: i32::MAX,
        }];
        // (2^31 - 1)^2 still fits in i64, squaring that again does not.
        for _ in 0..3 {
            ops.push(Instruction::Mul {
                dest: 0,
                lhs: slot(0),
                rhs: slot(0),
            });
        }
        assert_fault(ops, "MUL overflowed");
    }

    // ============================================================
    // Comparison and control flow
    // ============================================================

    #[test]
    fn test_cmp_sets_flag_for_every_relation() {
        let cases = [
            (RelOp::Eq, 3, 3, true),
            (RelOp::Ne, 3, 3, false),
            (RelOp::Lt, 2, 3, true),
            (RelOp::Le, 3, 3, true),
            (RelOp::Gt, 2, 3, false),
            (RelOp::Ge, 4, 3, true),
        ];
        for (op, a, b, expected) in cases {
            let mut vm = Vm::new();
            vm.run(&Program::from(vec![Instruction::Cmp {
                lhs: lit(a),
                rhs: lit(b),
                op,
            }]))
            .unwrap();
            assert_eq!(vm.flag(), expected, "{:?} {} {}", op, a, b);
        }
    }

    #[test]
    fn test_jump_if_false_taken_and_not_taken() {
        let program = |value: i32| {
            vec![
                Instruction::Set { dest: 0, value },
                Instruction::Cmp {
                    lhs: slot(0),
                    rhs: lit(5),
                    op: RelOp::Gt,
                },
                Instruction::JumpIfFalse { target: 4 },
                Instruction::Set { dest: 0, value: 1 },
                Instruction::Return { src: 0 },
            ]
        };
        assert_returns(program(9), 1);
        assert_returns(program(2), 2);
    }

    #[test]
    fn test_loop_counts_steps() {
        // a = 0; while a < 5 { a = a + 1 }; return a
        let ops = vec![
            Instruction::Set { dest: 0, value: 0 },
            Instruction::Cmp {
                lhs: slot(0),
                rhs: lit(5),
                op: RelOp::Lt,
            },
            Instruction::JumpIfFalse { target: 5 },
            Instruction::Add {
                dest: 0,
                lhs: slot(0),
                rhs: lit(1),
            },
            Instruction::Jump { target: 1 },
            Instruction::Return { src: 0 },
        ];
        let execution = run_ops(ops).unwrap();
        assert_eq!(execution.value, Some(5));
        // SET, 5 * (CMP JIF ADD JUMP), final CMP JIF, RETURN
        assert_eq!(execution.steps, 1 + 5 * 4 + 2 + 1);
    }

    #[test]
    fn test_falling_off_end_has_no_result() {
        let execution = run_ops(vec![Instruction::Set { dest: 0, value: 1 }]).unwrap();
        assert_eq!(
            execution,
            Execution {
                value: None,
                steps: 1
            }
        );
        assert_eq!(run_ops(Vec::new()).unwrap().value, None);
    }

    #[test]
    fn test_jump_to_program_length_halts() {
        let execution = run_ops(vec![
            Instruction::Jump { target: 2 },
            Instruction::Return { src: 0 },
        ])
        .unwrap();
        assert_eq!(execution.value, None);
    }

    #[test]
    fn test_jump_out_of_range() {
        assert_eq!(
            run_ops(vec![Instruction::Jump { target: 9 }]),
            Err(RuntimeFault::JumpOutOfRange {
                pc: 0,
                target: 9,
                len: 1
            })
        );
    }

    #[test]
    fn test_register_out_of_range() {
        assert_eq!(
            run_ops(vec![Instruction::Set {
                dest: 256,
                value: 1
            }]),
            Err(RuntimeFault::RegisterOutOfRange { pc: 0, slot: 256 })
        );
        assert_fault(
            vec![
                Instruction::Set { dest: 0, value: 1 },
                Instruction::Cmp {
                    lhs: slot(300),
                    rhs: lit(0),
                    op: RelOp::Eq,
                },
            ],
            "register r300 out of range",
        );
    }

    #[test]
    fn test_step_limit() {
        let infinite = vec![Instruction::Jump { target: 0 }];
        let err = run_ops_with_config(
            infinite,
            VmConfig {
                max_steps: Some(100),
            },
        )
        .unwrap_err();
        assert_eq!(err, RuntimeFault::StepLimitExceeded { limit: 100 });
    }

    #[test]
    fn test_step_limit_is_inclusive() {
        let ops = vec![
            Instruction::Set { dest: 0, value: 3 },
            Instruction::Return { src: 0 },
        ];
        let execution = run_ops_with_config(ops, VmConfig { max_steps: Some(2) }).unwrap();
        assert_eq!(execution.value, Some(3));
    }

    #[test]
    fn test_vm_is_reusable() {
        let mut vm = Vm::new();
        let first = Program::from(vec![
            Instruction::Set { dest: 0, value: 9 },
            Instruction::Return { src: 0 },
        ]);
        let second = Program::from(vec![Instruction::Return { src: 0 }]);
        assert_eq!(vm.run(&first).unwrap().value, Some(9));
        assert_eq!(vm.run(&second).unwrap().value, Some(0));
    }
}
