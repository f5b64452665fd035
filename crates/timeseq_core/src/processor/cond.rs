//! Condition evaluation.
//!
//! Conditions are trees of comparisons joined by `and`/`or`. Evaluation is
//! strictly left-to-right with short-circuiting, which is observable when
//! operand values have side effects (`rand` draws). The formatted form used
//! in assertion messages re-evaluates the operands, matching the voltages a
//! host would observe at the moment of failure.

use crate::processor::ProcessCtx;
use crate::processor::value::ValueRt;
use crate::script::model::CmpOp;

#[derive(Debug)]
pub struct CondRt {
    pub(crate) op: CondOp,
}

#[derive(Debug)]
pub(crate) enum CondOp {
    Cmp {
        op: CmpOp,
        a: ValueRt,
        b: ValueRt,
        tolerance: f32,
    },
    And(Box<CondRt>, Box<CondRt>),
    Or(Box<CondRt>, Box<CondRt>),
}

impl CondRt {
    pub fn eval(&self, ctx: &mut ProcessCtx) -> bool {
        match &self.op {
            CondOp::Cmp { op, a, b, tolerance } => {
                let x = a.eval(ctx);
                let y = b.eval(ctx);
                match op {
                    CmpOp::Eq => (x - y).abs() <= *tolerance,
                    CmpOp::Ne => (x - y).abs() > *tolerance,
                    CmpOp::Lt => x < y,
                    CmpOp::Lte => x <= y,
                    CmpOp::Gt => x > y,
                    CmpOp::Gte => x >= y,
                }
            }
            CondOp::And(left, right) => left.eval(ctx) && right.eval(ctx),
            CondOp::Or(left, right) => left.eval(ctx) || right.eval(ctx),
        }
    }

    /// Format the condition with its current operand values, e.g.
    /// `(1 eq 0.9999999)` or `((1 gt 0) and (2 lt 1))`.
    pub fn describe(&self, ctx: &mut ProcessCtx) -> String {
        match &self.op {
            CondOp::Cmp { op, a, b, .. } => {
                format!("({} {} {})", a.eval(ctx), op.as_str(), b.eval(ctx))
            }
            CondOp::And(left, right) => {
                format!("({} and {})", left.describe(ctx), right.describe(ctx))
            }
            CondOp::Or(left, right) => {
                format!("({} or {})", left.describe(ctx), right.describe(ctx))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{TriggerBus, VariableStore};
    use crate::host::Host;
    use crate::random::XorShift;

    struct NullHost;

    impl Host for NullHost {
        fn input_voltage(&self, _port: usize, _channel: usize) -> f32 {
            0.0
        }
        fn output_voltage(&self, _port: usize, _channel: usize) -> f32 {
            0.0
        }
        fn set_output_voltage(&mut self, _port: usize, _channel: usize, _voltage: f32) {}
        fn set_output_channels(&mut self, _port: usize, _channels: usize) {}
        fn set_output_label(&mut self, _port: usize, _label: &str) {}
        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    fn with_ctx<R>(f: impl FnOnce(&mut ProcessCtx) -> R) -> R {
        let mut host = NullHost;
        let mut vars = VariableStore::default();
        let mut triggers = TriggerBus::default();
        let mut rng = XorShift::new(0);
        let mut ctx = ProcessCtx {
            host: &mut host,
            vars: &mut vars,
            triggers: &mut triggers,
            rng: &mut rng,
            sample_rate: 48_000,
            stop_requested: false,
        };
        f(&mut ctx)
    }

    fn cmp(op: CmpOp, a: f32, b: f32, tolerance: f32) -> CondRt {
        CondRt {
            op: CondOp::Cmp {
                op,
                a: ValueRt::voltage(a),
                b: ValueRt::voltage(b),
                tolerance,
            },
        }
    }

    #[test]
    fn comparisons_follow_their_operator() {
        with_ctx(|ctx| {
            assert!(cmp(CmpOp::Eq, 1.0, 1.0, 0.0).eval(ctx));
            assert!(!cmp(CmpOp::Eq, 1.0, 1.1, 0.0).eval(ctx));
            assert!(cmp(CmpOp::Ne, 1.0, 1.1, 0.0).eval(ctx));
            assert!(cmp(CmpOp::Lt, 1.0, 2.0, 0.0).eval(ctx));
            assert!(!cmp(CmpOp::Lt, 2.0, 2.0, 0.0).eval(ctx));
            assert!(cmp(CmpOp::Lte, 2.0, 2.0, 0.0).eval(ctx));
            assert!(cmp(CmpOp::Gt, 3.0, 2.0, 0.0).eval(ctx));
            assert!(cmp(CmpOp::Gte, 2.0, 2.0, 0.0).eval(ctx));
        });
    }

    #[test]
    fn tolerance_widens_equality() {
        with_ctx(|ctx| {
            assert!(cmp(CmpOp::Eq, 1.0, 1.00005, 0.0001).eval(ctx));
            assert!(!cmp(CmpOp::Eq, 1.0, 1.0002, 0.0001).eval(ctx));
            assert!(!cmp(CmpOp::Ne, 1.0, 1.00005, 0.0001).eval(ctx));
        });
    }

    #[test]
    fn and_or_combine() {
        with_ctx(|ctx| {
            let both = CondRt {
                op: CondOp::And(
                    Box::new(cmp(CmpOp::Eq, 1.0, 1.0, 0.0)),
                    Box::new(cmp(CmpOp::Eq, 2.0, 2.0, 0.0)),
                ),
            };
            assert!(both.eval(ctx));

            let either = CondRt {
                op: CondOp::Or(
                    Box::new(cmp(CmpOp::Eq, 1.0, 0.0, 0.0)),
                    Box::new(cmp(CmpOp::Eq, 2.0, 2.0, 0.0)),
                ),
            };
            assert!(either.eval(ctx));
        });
    }

    #[test]
    fn describe_prints_unpadded_decimals() {
        with_ctx(|ctx| {
            assert_eq!(cmp(CmpOp::Eq, 1.0, 0.0, 0.0).describe(ctx), "(1 eq 0)");
            assert_eq!(
                cmp(CmpOp::Gt, 0.9999999, 1.5, 0.0).describe(ctx),
                "(0.9999999 gt 1.5)"
            );
        });
    }

    #[test]
    fn describe_nests_compounds() {
        with_ctx(|ctx| {
            let tree = CondRt {
                op: CondOp::Or(
                    Box::new(cmp(CmpOp::Eq, 1.0, 0.0, 0.0)),
                    Box::new(CondRt {
                        op: CondOp::And(
                            Box::new(cmp(CmpOp::Lt, 1.0, 2.0, 0.0)),
                            Box::new(cmp(CmpOp::Gte, 3.0, 3.0, 0.0)),
                        ),
                    }),
                ),
            };
            assert_eq!(
                tree.describe(ctx),
                "((1 eq 0) or ((1 lt 2) and (3 gte 3)))"
            );
        });
    }
}
