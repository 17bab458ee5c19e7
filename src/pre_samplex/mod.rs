//! The pre-samplex: the intermediate graph the builder emits while walking
//! the annotated circuit, and its lowering into an executable samplex.
//!
//! Nodes describe what will happen at sampling time (draw, propagate,
//! combine, collect); edges carry the qubit subset they concern and the
//! direction the register flows along the circuit's time axis. *Danglers*
//! are unmatched endpoints, keyed by qubit: producers are emitted registers
//! still traveling, acceptors are open collect chains waiting for registers
//! to arrive. Claiming matches them up as later boxes are built.

use std::collections::HashMap;

use itertools::Itertools;
use ndarray::Array2;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::{Result, SamplexBuildError};
use crate::noise::{NoiseModel, NoiseRequirement};
use crate::params::ParameterExpressionTable;
use crate::samplex::Samplex;
use crate::samplex::nodes::{
    C1PastCliffordNode, ChangeBasisNode, CollectTemplateValues, CollectZ2ToOutputNode,
    CombineOperand, CombineRegistersNode, CopyNode, InjectNoiseNode, MultiplySide, Node,
    PauliPastCliffordNode, TwirlSamplingNode, U2ParametricMultiplicationNode, U2WordOp,
};
use crate::synths::Synth;
use crate::tensor::{Dtype, TensorSpec};
use virtual_registers::distributions::Distribution;
use virtual_registers::registers::VirtualKind;
use virtual_registers::tables::Conjugation;

/// Flow direction along the circuit's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward earlier circuit moments.
    Left,
    /// Toward later circuit moments.
    Right,
}

/// Output port of a source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Twirl samples (collected into the box's own dressing).
    Lhs,
    /// Twirl inverses (the traveling half of the pair).
    Rhs,
    /// The Pauli register of a noise sample.
    Main,
    /// The sign register of a noise sample.
    Sign,
}

/// Kinds of pre-samplex nodes, used by dangler matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreNodeKind {
    Sample,
    Propagate,
    Collect,
    Combine,
    Copy,
    Emit,
}

/// What a sample node draws.
#[derive(Debug, Clone)]
pub enum SampleSource {
    Twirl { distribution: Distribution },
    Noise {
        noise_ref: String,
        modifier_ref: Option<String>,
        model: NoiseModel,
    },
}

/// A fixed operation a register passes through.
#[derive(Debug, Clone)]
pub enum PropagateOp {
    Entangler { gate: String, qubits: (usize, usize) },
    SingleClifford { gate: String, qubit: usize },
}

/// What a collect node consumes registers for.
#[derive(Debug, Clone)]
pub enum CollectKind {
    TemplateValues {
        synth: Synth,
        param_idxs: Array2<usize>,
    },
    Z2Output {
        output: String,
        positions: Vec<usize>,
    },
}

/// A pre-samplex node.
#[derive(Debug, Clone)]
pub enum PreNode {
    Sample(SampleSource),
    Propagate(PropagateOp),
    Combine,
    Collect(CollectKind),
    Copy,
    Emit(Direction),
}

impl PreNode {
    pub fn kind(&self) -> PreNodeKind {
        match self {
            PreNode::Sample(_) => PreNodeKind::Sample,
            PreNode::Propagate(_) => PreNodeKind::Propagate,
            PreNode::Combine => PreNodeKind::Combine,
            PreNode::Collect(_) => PreNodeKind::Collect,
            PreNode::Copy => PreNodeKind::Copy,
            PreNode::Emit(_) => PreNodeKind::Emit,
        }
    }
}

/// Edge annotation: the qubits carried and the flow direction.
#[derive(Debug, Clone)]
pub struct PreEdge {
    pub qubits: Vec<usize>,
    pub direction: Direction,
}

/// A step a register takes between its source and a consumer.
#[derive(Debug, Clone)]
enum FlowOp {
    Past { node: NodeIndex, direction: Direction },
    Copy { node: NodeIndex },
}

/// One operand of a dressing: a source register, the steps it takes, and
/// the qubits it contributes.
#[derive(Debug, Clone)]
struct Contribution {
    source: (NodeIndex, Port),
    ops: Vec<FlowOp>,
    qubits: Vec<usize>,
    order: usize,
    own: bool,
}

/// A single-qubit operation folded into a dressing after combination.
#[derive(Debug, Clone)]
pub enum DressOp {
    Word {
        word: Vec<U2WordOp>,
        qubits: Vec<usize>,
        side: MultiplySide,
    },
    Basis {
        input_name: String,
        source_kind: VirtualKind,
        side: MultiplySide,
    },
}

/// Everything needed to lower one dressed layer.
#[derive(Debug)]
struct CollectRecord {
    combine: NodeIndex,
    rows: Vec<usize>,
    synth: Synth,
    param_idxs: Array2<usize>,
    dress_ops: Vec<DressOp>,
    contributions: Vec<Contribution>,
}

/// Everything needed to lower one Z2 collection.
#[derive(Debug)]
struct Z2Record {
    source: (NodeIndex, Port),
    ops: Vec<FlowOp>,
    /// Qubits of the source rows to collect, in output-position order.
    qubits: Vec<usize>,
    output: String,
    positions: Vec<usize>,
}

#[derive(Debug, Clone)]
enum ChainState {
    Producer {
        source: (NodeIndex, Port),
        rows: Vec<usize>,
        kind: VirtualKind,
        ops: Vec<FlowOp>,
        direction: Direction,
        head: NodeIndex,
        head_kind: PreNodeKind,
        own: bool,
    },
    Acceptor {
        combine: NodeIndex,
        /// Ops in circuit order; an arriving register crosses them in
        /// reverse.
        ops_outward: Vec<FlowOp>,
        head: NodeIndex,
        head_kind: PreNodeKind,
    },
}

impl ChainState {
    fn head_kind(&self) -> PreNodeKind {
        match self {
            ChainState::Producer { head_kind, .. } | ChainState::Acceptor { head_kind, .. } => {
                *head_kind
            }
        }
    }
}

/// Whether a dangler entry is a traveling register or an open chain waiting
/// for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanglerRole {
    Producer,
    Acceptor,
}

/// Predicate for dangler claiming: flow direction, role, and accepted head
/// node kinds.
#[derive(Debug, Clone)]
pub struct DanglerMatch {
    pub direction: Direction,
    pub role: DanglerRole,
    pub head_kinds: Vec<PreNodeKind>,
}

#[derive(Debug, Clone)]
struct Dangler {
    qubit: usize,
    chain: usize,
}

/// A handle to one dressed layer under construction.
#[derive(Debug, Clone, Copy)]
pub struct CollectHandle {
    combine: NodeIndex,
}

/// The builder's intermediate graph, with the bookkeeping needed to lower
/// it into a samplex.
#[derive(Debug, Default)]
pub struct PreSamplex {
    pub graph: StableDiGraph<PreNode, PreEdge>,
    chains: Vec<ChainState>,
    danglers: Vec<Dangler>,
    collect_records: Vec<CollectRecord>,
    z2_records: Vec<Z2Record>,
    /// Qubit rows of each sample node's primary register, in row order.
    sample_rows: HashMap<NodeIndex, Vec<usize>>,
    basis_inputs: Vec<(String, VirtualKind, usize)>,
    pub param_table: ParameterExpressionTable,
    pub passthrough: Vec<(usize, usize)>,
    pub num_clbits: usize,
    order_counter: usize,
}

impl PreSamplex {
    pub fn new(num_clbits: usize) -> Self {
        Self {
            num_clbits,
            ..Self::default()
        }
    }

    fn next_order(&mut self) -> usize {
        self.order_counter += 1;
        self.order_counter
    }

    /// A snapshot of the dangler set, for building conditional branches
    /// against identical surroundings.
    pub fn snapshot_danglers(&self) -> Vec<(usize, usize)> {
        self.danglers
            .iter()
            .map(|dangler| (dangler.qubit, dangler.chain))
            .collect()
    }

    pub fn restore_danglers(&mut self, snapshot: &[(usize, usize)]) {
        self.danglers = snapshot
            .iter()
            .map(|&(qubit, chain)| Dangler { qubit, chain })
            .collect();
    }

    fn chain_direction(&self, chain: usize) -> Direction {
        match &self.chains[chain] {
            ChainState::Producer { direction, .. } => *direction,
            ChainState::Acceptor { .. } => Direction::Left,
        }
    }

    /// Removes and returns dangler entries matching the predicate on any of
    /// the given qubits, grouped by chain in first-insertion order.
    pub fn find_then_remove_danglers(
        &mut self,
        matcher: &DanglerMatch,
        qubits: &[usize],
    ) -> Vec<(usize, Vec<usize>)> {
        let mut claimed: Vec<(usize, Vec<usize>)> = Vec::new();
        let mut remaining = Vec::new();
        for dangler in std::mem::take(&mut self.danglers) {
            let chain = &self.chains[dangler.chain];
            let role = match chain {
                ChainState::Producer { .. } => DanglerRole::Producer,
                ChainState::Acceptor { .. } => DanglerRole::Acceptor,
            };
            let matches = qubits.contains(&dangler.qubit)
                && role == matcher.role
                && self.chain_direction(dangler.chain) == matcher.direction
                && matcher.head_kinds.contains(&chain.head_kind());
            if matches {
                if let Some((_, group_qubits)) = claimed
                    .iter_mut()
                    .find(|(chain_id, _)| *chain_id == dangler.chain)
                {
                    group_qubits.push(dangler.qubit);
                } else {
                    claimed.push((dangler.chain, vec![dangler.qubit]));
                }
            } else {
                remaining.push(dangler);
            }
        }
        self.danglers = remaining;
        claimed
    }

    fn add_danglers(&mut self, chain: usize, qubits: &[usize]) {
        for &qubit in qubits {
            self.danglers.push(Dangler { qubit, chain });
        }
    }

    /// Opens a dressed layer: creates the combine/collect pair, absorbs any
    /// rightward-traveling registers on its qubits as contributions, and
    /// registers the combine as an open acceptor for registers arriving
    /// from the right.
    ///
    /// `rows` are the dressing's qubits in row order.
    pub fn add_collect(
        &mut self,
        rows: &[usize],
        synth: Synth,
        param_idxs: Array2<usize>,
    ) -> CollectHandle {
        let combine = self.graph.add_node(PreNode::Combine);
        let collect = self.graph.add_node(PreNode::Collect(CollectKind::TemplateValues {
            synth,
            param_idxs: param_idxs.clone(),
        }));
        self.graph.add_edge(
            combine,
            collect,
            PreEdge {
                qubits: rows.to_vec(),
                direction: Direction::Right,
            },
        );

        self.collect_records.push(CollectRecord {
            combine,
            rows: rows.to_vec(),
            synth,
            param_idxs,
            dress_ops: Vec::new(),
            contributions: Vec::new(),
        });

        // Claim every rightward register traveling into this dressing.
        let matcher = DanglerMatch {
            direction: Direction::Right,
            role: DanglerRole::Producer,
            head_kinds: vec![PreNodeKind::Sample, PreNodeKind::Propagate, PreNodeKind::Emit, PreNodeKind::Copy],
        };
        for (chain_id, qubits) in self.find_then_remove_danglers(&matcher, rows) {
            let order = self.next_order();
            let ChainState::Producer { source, ops, own, head, .. } = self.chains[chain_id].clone()
            else {
                unreachable!("matcher selects producers");
            };
            self.graph.add_edge(
                head,
                combine,
                PreEdge {
                    qubits: qubits.clone(),
                    direction: Direction::Right,
                },
            );
            self.record_contribution(
                combine,
                Contribution {
                    source,
                    ops,
                    qubits,
                    order,
                    own,
                },
            );
        }

        // Open the acceptor side toward future leftward flows.
        let chain_id = self.chains.len();
        self.chains.push(ChainState::Acceptor {
            combine,
            ops_outward: Vec::new(),
            head: combine,
            head_kind: PreNodeKind::Combine,
        });
        self.add_danglers(chain_id, rows);

        CollectHandle { combine }
    }

    fn record_contribution(&mut self, combine: NodeIndex, contribution: Contribution) {
        let record = self
            .collect_records
            .iter_mut()
            .find(|record| record.combine == combine)
            .expect("contributions target an existing collect");
        record.contributions.push(contribution);
    }

    /// Appends a single-qubit word to a dressing's post-combination chain.
    pub fn append_dress_word(
        &mut self,
        handle: CollectHandle,
        word: Vec<U2WordOp>,
        qubits: Vec<usize>,
        side: MultiplySide,
    ) {
        let record = self
            .collect_records
            .iter_mut()
            .find(|record| record.combine == handle.combine)
            .expect("dress ops target an existing collect");
        record.dress_ops.push(DressOp::Word { word, qubits, side });
    }

    /// Appends an input-bound basis change to a dressing's chain.
    pub fn append_dress_basis(
        &mut self,
        handle: CollectHandle,
        input_name: String,
        source_kind: VirtualKind,
        side: MultiplySide,
    ) {
        let record = self
            .collect_records
            .iter_mut()
            .find(|record| record.combine == handle.combine)
            .expect("dress ops target an existing collect");
        let num_rows = record.rows.len();
        record.dress_ops.push(DressOp::Basis {
            input_name: input_name.clone(),
            source_kind,
            side,
        });
        self.basis_inputs.push((input_name, source_kind, num_rows));
    }

    /// Records a fixed Clifford operation and threads every open chain
    /// crossing its qubits through it.
    pub fn add_propagate(&mut self, op: PropagateOp) -> Result<NodeIndex> {
        let op_qubits: Vec<usize> = match &op {
            PropagateOp::Entangler { qubits, .. } => vec![qubits.0, qubits.1],
            PropagateOp::SingleClifford { qubit, .. } => vec![*qubit],
        };
        let node = self.graph.add_node(PreNode::Propagate(op));

        // Rightward-traveling registers cross the gate on their way to a
        // later dressing; leftward-traveling ones were emitted past it
        // already. Open acceptor chains extend so registers arriving later
        // from the right cross the gate before joining the dressing.
        for (role, direction) in [
            (DanglerRole::Producer, Direction::Right),
            (DanglerRole::Acceptor, Direction::Left),
        ] {
            {
                let matcher = DanglerMatch {
                    direction,
                    role,
                    head_kinds: vec![
                        PreNodeKind::Sample,
                        PreNodeKind::Propagate,
                        PreNodeKind::Combine,
                        PreNodeKind::Emit,
                        PreNodeKind::Copy,
                    ],
                };
                for (chain_id, qubits) in self.find_then_remove_danglers(&matcher, &op_qubits) {
                    if op_qubits.len() == 2 && qubits.len() != 2 {
                        let pair = (op_qubits[0], op_qubits[1]);
                        return Err(
                            SamplexBuildError::EntanglerAcrossFlowBoundary(pair.0, pair.1).into()
                        );
                    }
                    match &mut self.chains[chain_id] {
                        ChainState::Producer {
                            ops,
                            head,
                            head_kind,
                            direction: flow,
                            ..
                        } => {
                            let flow = *flow;
                            self.graph.add_edge(
                                *head,
                                node,
                                PreEdge {
                                    qubits: qubits.clone(),
                                    direction: flow,
                                },
                            );
                            ops.push(FlowOp::Past {
                                node,
                                direction: flow,
                            });
                            *head = node;
                            *head_kind = PreNodeKind::Propagate;
                        }
                        ChainState::Acceptor {
                            ops_outward,
                            head,
                            head_kind,
                            ..
                        } => {
                            self.graph.add_edge(
                                node,
                                *head,
                                PreEdge {
                                    qubits: qubits.clone(),
                                    direction: Direction::Left,
                                },
                            );
                            ops_outward.push(FlowOp::Past {
                                node,
                                direction: Direction::Left,
                            });
                            *head = node;
                            *head_kind = PreNodeKind::Propagate;
                        }
                    }
                    self.add_danglers(chain_id, &qubits);
                }
            }
        }
        Ok(node)
    }

    /// Emits a twirl at a box edge.
    ///
    /// For a left-dressed box (emission at the right edge), the samples feed
    /// the box's own dressing and the inverses travel rightward after
    /// crossing the box's entanglers. Measured qubits divert their inverse
    /// rows into a measurement-flip collection instead of a dangler.
    ///
    /// For a right-dressed box (emission at the left edge), qubits already
    /// covered by arriving rightward registers draw no fresh samples; the
    /// remaining qubits sample, with the samples traveling rightward through
    /// the box into its dressing and the inverses traveling leftward into
    /// whatever open dressings they find.
    #[allow(clippy::too_many_arguments)]
    pub fn add_emit_twirl(
        &mut self,
        rows: Vec<usize>,
        distribution: Distribution,
        dressing_left: bool,
        own_collect: Option<CollectHandle>,
        entangler_ops: &[NodeIndex],
        measured: &[(usize, usize)],
        flip_output: Option<&str>,
    ) -> NodeIndex {
        let kind = distribution.register_kind();
        let sample = self.graph.add_node(PreNode::Sample(SampleSource::Twirl {
            distribution,
        }));
        self.sample_rows.insert(sample, rows.clone());

        if dressing_left {
            // own samples straight into the dressing
            if let Some(handle) = own_collect {
                let order = self.next_order();
                self.graph.add_edge(
                    sample,
                    handle.combine,
                    PreEdge {
                        qubits: rows.clone(),
                        direction: Direction::Right,
                    },
                );
                self.record_contribution(
                    handle.combine,
                    Contribution {
                        source: (sample, Port::Lhs),
                        ops: Vec::new(),
                        qubits: rows.clone(),
                        order,
                        own: true,
                    },
                );
            }

            // inverses cross the box entanglers and exit rightward
            let emit = self.graph.add_node(PreNode::Emit(Direction::Right));
            let ops: Vec<FlowOp> = entangler_ops
                .iter()
                .map(|&node| FlowOp::Past {
                    node,
                    direction: Direction::Right,
                })
                .collect();
            self.graph.add_edge(
                sample,
                emit,
                PreEdge {
                    qubits: rows.clone(),
                    direction: Direction::Right,
                },
            );

            let measured_qubits: Vec<usize> =
                measured.iter().map(|&(qubit, _)| qubit).collect();
            if !measured_qubits.is_empty()
                && let Some(output) = flip_output
            {
                let positions: Vec<usize> = measured.iter().map(|&(_, clbit)| clbit).collect();
                let collect = self.graph.add_node(PreNode::Collect(CollectKind::Z2Output {
                    output: output.to_string(),
                    positions: positions.clone(),
                }));
                self.graph.add_edge(
                    emit,
                    collect,
                    PreEdge {
                        qubits: measured_qubits.clone(),
                        direction: Direction::Right,
                    },
                );
                self.z2_records.push(Z2Record {
                    source: (sample, Port::Rhs),
                    ops: ops.clone(),
                    qubits: measured_qubits.clone(),
                    output: output.to_string(),
                    positions,
                });
            }

            let free_rows: Vec<usize> = rows
                .iter()
                .copied()
                .filter(|qubit| !measured_qubits.contains(qubit))
                .collect();
            let chain_id = self.chains.len();
            self.chains.push(ChainState::Producer {
                source: (sample, Port::Rhs),
                rows: rows.clone(),
                kind,
                ops,
                direction: Direction::Right,
                head: emit,
                head_kind: PreNodeKind::Emit,
                own: false,
            });
            self.add_danglers(chain_id, &free_rows);
        } else {
            // right-dressed: samples travel rightward into the dressing
            let lhs_chain = self.chains.len();
            self.chains.push(ChainState::Producer {
                source: (sample, Port::Lhs),
                rows: rows.clone(),
                kind,
                ops: Vec::new(),
                direction: Direction::Right,
                head: sample,
                head_kind: PreNodeKind::Sample,
                own: true,
            });
            self.add_danglers(lhs_chain, &rows);

            // inverses travel leftward into open dressings
            self.emit_leftward(sample, Port::Rhs, rows, kind);
        }
        sample
    }

    /// Qubits of `rows` currently covered by rightward-traveling registers.
    pub fn rightward_coverage(&self, rows: &[usize]) -> Vec<usize> {
        self.danglers
            .iter()
            .filter(|dangler| {
                rows.contains(&dangler.qubit)
                    && matches!(
                        self.chains[dangler.chain],
                        ChainState::Producer {
                            direction: Direction::Right,
                            ..
                        }
                    )
            })
            .map(|dangler| dangler.qubit)
            .collect()
    }

    /// Sends a register leftward: claims open acceptor chains on its
    /// qubits, contributing to their dressings; unclaimed qubits dangle as
    /// circuit-edge exits.
    fn emit_leftward(
        &mut self,
        source: NodeIndex,
        port: Port,
        rows: Vec<usize>,
        kind: VirtualKind,
    ) {
        let matcher = DanglerMatch {
            direction: Direction::Left,
            role: DanglerRole::Acceptor,
            head_kinds: vec![
                PreNodeKind::Combine,
                PreNodeKind::Propagate,
                PreNodeKind::Copy,
            ],
        };
        let claims = self.find_then_remove_danglers(&matcher, &rows);
        let mut claimed_qubits = Vec::new();
        for (chain_id, qubits) in claims {
            let order = self.next_order();
            let ChainState::Acceptor {
                combine,
                ops_outward,
                head,
                ..
            } = self.chains[chain_id].clone()
            else {
                unreachable!("matcher selects acceptors");
            };
            self.graph.add_edge(
                source,
                head,
                PreEdge {
                    qubits: qubits.clone(),
                    direction: Direction::Left,
                },
            );
            let ops: Vec<FlowOp> = ops_outward.iter().rev().cloned().collect();
            claimed_qubits.extend(qubits.iter().copied());
            self.record_contribution(
                combine,
                Contribution {
                    source: (source, port),
                    ops,
                    qubits,
                    order,
                    own: false,
                },
            );
        }

        let unclaimed: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|qubit| !claimed_qubits.contains(qubit))
            .collect();
        if !unclaimed.is_empty() {
            let chain_id = self.chains.len();
            self.chains.push(ChainState::Producer {
                source: (source, port),
                rows,
                kind,
                ops: Vec::new(),
                direction: Direction::Left,
                head: source,
                head_kind: PreNodeKind::Sample,
                own: false,
            });
            self.add_danglers(chain_id, &unclaimed);
        }
    }

    /// Emits a noise injection at a box edge. Noise attached to a
    /// left-dressed box travels rightward into the next dressing; noise
    /// attached to a right-dressed box travels leftward into earlier ones.
    /// The sign register is collected into `noise_signs.<ref>` either way.
    pub fn add_emit_noise(
        &mut self,
        rows: Vec<usize>,
        noise_ref: String,
        modifier_ref: Option<String>,
        model: NoiseModel,
        dressing_left: bool,
    ) -> NodeIndex {
        let output = format!("noise_signs.{noise_ref}");
        let sample = self.graph.add_node(PreNode::Sample(SampleSource::Noise {
            noise_ref,
            modifier_ref,
            model,
        }));
        self.sample_rows.insert(sample, rows.clone());

        let sign_collect = self.graph.add_node(PreNode::Collect(CollectKind::Z2Output {
            output: output.clone(),
            positions: vec![0],
        }));
        self.graph.add_edge(
            sample,
            sign_collect,
            PreEdge {
                qubits: vec![],
                direction: Direction::Right,
            },
        );
        self.z2_records.push(Z2Record {
            source: (sample, Port::Sign),
            ops: Vec::new(),
            qubits: vec![],
            output,
            positions: vec![0],
        });

        if dressing_left {
            let chain_id = self.chains.len();
            self.chains.push(ChainState::Producer {
                source: (sample, Port::Main),
                rows: rows.clone(),
                kind: VirtualKind::Pauli,
                ops: Vec::new(),
                direction: Direction::Right,
                head: sample,
                head_kind: PreNodeKind::Sample,
                own: false,
            });
            self.add_danglers(chain_id, &rows);
        } else {
            self.emit_leftward(sample, Port::Main, rows, VirtualKind::Pauli);
        }
        sample
    }

    /// Wraps the matching danglers in copy nodes, one per claimed chain,
    /// returning the new chain ids and their qubits. The caller re-registers
    /// them as danglers when the branch bookkeeping is done.
    pub fn wrap_danglers_in_copies(
        &mut self,
        matcher: &DanglerMatch,
        qubits: &[usize],
    ) -> Vec<(usize, Vec<usize>)> {
        let claims = self.find_then_remove_danglers(matcher, qubits);
        let mut wrapped = Vec::new();
        for (chain_id, chain_qubits) in claims {
            let copy = self.graph.add_node(PreNode::Copy);
            let new_chain = self.chains.len();
            match self.chains[chain_id].clone() {
                ChainState::Producer {
                    source,
                    rows,
                    kind,
                    mut ops,
                    direction,
                    head,
                    own,
                    ..
                } => {
                    self.graph.add_edge(
                        head,
                        copy,
                        PreEdge {
                            qubits: chain_qubits.clone(),
                            direction,
                        },
                    );
                    ops.push(FlowOp::Copy { node: copy });
                    self.chains.push(ChainState::Producer {
                        source,
                        rows,
                        kind,
                        ops,
                        direction,
                        head: copy,
                        head_kind: PreNodeKind::Copy,
                        own,
                    });
                }
                ChainState::Acceptor {
                    combine,
                    mut ops_outward,
                    head,
                    ..
                } => {
                    self.graph.add_edge(
                        copy,
                        head,
                        PreEdge {
                            qubits: chain_qubits.clone(),
                            direction: Direction::Left,
                        },
                    );
                    ops_outward.push(FlowOp::Copy { node: copy });
                    self.chains.push(ChainState::Acceptor {
                        combine,
                        ops_outward,
                        head: copy,
                        head_kind: PreNodeKind::Copy,
                    });
                }
            }
            wrapped.push((new_chain, chain_qubits));
        }
        wrapped
    }

    /// Re-registers a chain's danglers, e.g. after snapshotting around a
    /// conditional branch.
    pub fn re_register(&mut self, chain_id: usize, qubits: &[usize]) {
        self.add_danglers(chain_id, qubits);
    }

    /// The acceptor chain id currently headed at the given collect handle's
    /// combine, if its danglers were dropped and need re-registration.
    pub fn acceptor_chain_of(&self, handle: CollectHandle) -> Option<usize> {
        self.chains.iter().position(|chain| {
            matches!(chain, ChainState::Acceptor { combine, .. } if *combine == handle.combine)
        })
    }

    /// Whether any open dangler touches one of the given qubits.
    pub fn has_open_flows(&self, qubits: &[usize]) -> bool {
        self.danglers
            .iter()
            .any(|dangler| qubits.contains(&dangler.qubit))
    }
}

/// Lowering: turning the pre-samplex into an (unfinalized) samplex.
impl PreSamplex {
    pub fn finalize(self) -> Result<Samplex> {
        Lowerer::new(self).run()
    }
}

struct Lowerer {
    pre: PreSamplex,
    samplex: Samplex,
    /// (register name, row qubits, kind) per sample port.
    source_info: HashMap<(NodeIndex, Port), (String, Vec<usize>, VirtualKind)>,
    /// Samplex node that last wrote each register.
    last_writer: HashMap<String, petgraph::stable_graph::NodeIndex>,
    flow_counter: usize,
}

impl Lowerer {
    fn new(pre: PreSamplex) -> Self {
        Self {
            pre,
            samplex: Samplex::new(),
            source_info: HashMap::new(),
            last_writer: HashMap::new(),
            flow_counter: 0,
        }
    }

    fn run(mut self) -> Result<Samplex> {
        let param_table = std::mem::take(&mut self.pre.param_table);
        let passthrough = std::mem::take(&mut self.pre.passthrough);
        for expression in param_table.expressions() {
            self.samplex.append_parameter_expression(expression.clone());
        }
        self.samplex.set_passthrough_params(passthrough);

        self.lower_samples()?;
        self.lower_basis_inputs()?;

        let records = std::mem::take(&mut self.pre.collect_records);
        for (idx, record) in records.into_iter().enumerate() {
            self.lower_collect(idx, record)?;
        }

        let z2_records = std::mem::take(&mut self.pre.z2_records);
        let mut flip_widths: HashMap<String, usize> = HashMap::new();
        for record in &z2_records {
            let width = record.positions.iter().copied().max().map_or(1, |max| max + 1);
            let width = if record.output.starts_with("measurement_flips") {
                width.max(self.pre.num_clbits)
            } else {
                width
            };
            let entry = flip_widths.entry(record.output.clone()).or_insert(width);
            *entry = (*entry).max(width);
        }
        for (name, width) in &flip_widths {
            self.samplex.add_output(
                TensorSpec::new(name.clone(), &[*width], Dtype::Bool)
                    .describe("Boolean flips, one column per bit position."),
            )?;
        }
        for record in z2_records {
            self.lower_z2(record)?;
        }

        Ok(self.samplex)
    }

    fn lower_samples(&mut self) -> Result<()> {
        let mut node_indices: Vec<NodeIndex> = self.pre.graph.node_indices().collect();
        node_indices.sort_unstable();
        let mut twirl_count = 0usize;
        let mut noise_count = 0usize;
        for node_idx in node_indices {
            let PreNode::Sample(source) = &self.pre.graph[node_idx] else {
                continue;
            };
            match source.clone() {
                SampleSource::Twirl { distribution } => {
                    let lhs = format!("twirl{twirl_count}");
                    let rhs = format!("twirl{twirl_count}_inv");
                    twirl_count += 1;
                    let kind = distribution.register_kind();
                    let rows = self.sample_rows(node_idx, distribution.num_subsystems());
                    let samplex_idx = self.samplex.add_node(Node::TwirlSampling(
                        TwirlSamplingNode {
                            lhs_register: lhs.clone(),
                            rhs_register: rhs.clone(),
                            distribution,
                        },
                    ))?;
                    self.last_writer.insert(lhs.clone(), samplex_idx);
                    self.last_writer.insert(rhs.clone(), samplex_idx);
                    self.source_info
                        .insert((node_idx, Port::Lhs), (lhs, rows.clone(), kind));
                    self.source_info
                        .insert((node_idx, Port::Rhs), (rhs, rows, kind));
                }
                SampleSource::Noise {
                    noise_ref,
                    modifier_ref,
                    model,
                } => {
                    let register = format!("noise{noise_count}");
                    let sign = format!("noise{noise_count}_sign");
                    noise_count += 1;
                    let rows = self.sample_rows(node_idx, model.num_qubits());

                    self.samplex.add_input(
                        TensorSpec::new(
                            format!("noise_maps.{noise_ref}"),
                            &[model.num_terms()],
                            Dtype::F64,
                        )
                        .describe(format!(
                            "The rates of a noise map with {} terms acting on {} qubits.",
                            model.num_terms(),
                            model.num_qubits()
                        )),
                        true,
                    )?;
                    let mut modifiers = std::collections::BTreeSet::new();
                    if let Some(modifier) = &modifier_ref {
                        modifiers.insert(modifier.clone());
                        self.samplex.add_input(
                            TensorSpec::new(format!("noise_scales.{modifier}"), &[], Dtype::F64)
                                .describe("A factor by which to scale a noise map.")
                                .optional(),
                            true,
                        )?;
                        self.samplex.add_input(
                            TensorSpec::new(
                                format!("local_scales.{modifier}"),
                                &[model.num_terms()],
                                Dtype::F64,
                            )
                            .describe(
                                "Factors by which to scale individual rates of a noise map.",
                            )
                            .optional(),
                            true,
                        )?;
                    }
                    self.samplex.add_noise_requirement(NoiseRequirement {
                        noise_ref: noise_ref.clone(),
                        num_qubits: model.num_qubits(),
                        num_terms: model.num_terms(),
                        noise_modifiers: modifiers,
                    })?;

                    let samplex_idx =
                        self.samplex
                            .add_node(Node::InjectNoise(InjectNoiseNode {
                                register: register.clone(),
                                sign_register: sign.clone(),
                                noise_ref,
                                modifier_ref,
                                model,
                            }))?;
                    self.last_writer.insert(register.clone(), samplex_idx);
                    self.last_writer.insert(sign.clone(), samplex_idx);
                    self.source_info.insert(
                        (node_idx, Port::Main),
                        (register, rows, VirtualKind::Pauli),
                    );
                    self.source_info
                        .insert((node_idx, Port::Sign), (sign, vec![0], VirtualKind::Z2));
                }
            }
        }
        Ok(())
    }

    /// The qubit rows of a sample node's register, recorded at emission
    /// time.
    fn sample_rows(&self, node_idx: NodeIndex, num_subsystems: usize) -> Vec<usize> {
        self.pre
            .sample_rows
            .get(&node_idx)
            .cloned()
            .unwrap_or_else(|| (0..num_subsystems).collect())
    }

    fn lower_basis_inputs(&mut self) -> Result<()> {
        let inputs = std::mem::take(&mut self.pre.basis_inputs);
        for (name, _kind, num_rows) in inputs {
            self.samplex.add_input(
                TensorSpec::new(name, &[num_rows], Dtype::U8)
                    .describe("Group element indices, one per dressed qubit.")
                    .optional(),
                true,
            )?;
        }
        Ok(())
    }

    fn read_edge(&mut self, register: &str, node: petgraph::stable_graph::NodeIndex) {
        if let Some(&writer) = self.last_writer.get(register) {
            let _ = self.samplex.add_edge(writer, node);
        }
    }

    /// Materializes a contribution: a register name carrying the source
    /// samples after every conjugation and copy along its path, plus the
    /// row qubits of that register.
    fn lower_flow(
        &mut self,
        source: &(NodeIndex, Port),
        ops: &[FlowOp],
    ) -> Result<(String, Vec<usize>, VirtualKind)> {
        let (mut name, rows, kind) = self
            .source_info
            .get(source)
            .cloned()
            .expect("every contribution source is a lowered sample");

        let mut private = false;
        for op in ops {
            match op {
                FlowOp::Copy { .. } => {
                    name = self.copy_register(&name, rows.len(), kind)?;
                    private = true;
                }
                FlowOp::Past { node, direction } => {
                    if !private {
                        name = self.copy_register(&name, rows.len(), kind)?;
                        private = true;
                    }
                    let PreNode::Propagate(prop) = self.pre.graph[*node].clone() else {
                        unreachable!("flow ops reference propagate nodes");
                    };
                    let conjugation = match direction {
                        Direction::Right => Conjugation::ByGate,
                        Direction::Left => Conjugation::ByAdjoint,
                    };
                    let subsystems: Vec<Vec<usize>> = match &prop {
                        PropagateOp::Entangler { qubits, .. } => {
                            let low = rows.iter().position(|&q| q == qubits.0);
                            let high = rows.iter().position(|&q| q == qubits.1);
                            match (low, high) {
                                (Some(low), Some(high)) => vec![vec![low, high]],
                                _ => {
                                    return Err(SamplexBuildError::EntanglerAcrossFlowBoundary(
                                        qubits.0, qubits.1,
                                    )
                                    .into());
                                }
                            }
                        }
                        PropagateOp::SingleClifford { qubit, .. } => {
                            match rows.iter().position(|&q| q == *qubit) {
                                Some(row) => vec![vec![row]],
                                None => continue,
                            }
                        }
                    };
                    let gate = match &prop {
                        PropagateOp::Entangler { gate, .. }
                        | PropagateOp::SingleClifford { gate, .. } => gate.clone(),
                    };
                    let samplex_node = match kind {
                        VirtualKind::Pauli => Node::PauliPastClifford(PauliPastCliffordNode {
                            gate,
                            register: name.clone(),
                            subsystems,
                            conjugation,
                        }),
                        VirtualKind::C1 => Node::C1PastClifford(C1PastCliffordNode {
                            gate,
                            register: name.clone(),
                            subsystems,
                            conjugation,
                        }),
                        other => {
                            return Err(SamplexBuildError::UnpropagatableKind(other).into());
                        }
                    };
                    let idx = self.samplex.add_node(samplex_node)?;
                    self.read_edge(&name, idx);
                    self.last_writer.insert(name.clone(), idx);
                }
            }
        }
        Ok((name, rows, kind))
    }

    fn copy_register(
        &mut self,
        name: &str,
        num_subsystems: usize,
        kind: VirtualKind,
    ) -> Result<String> {
        let copy_name = format!("flow{}", self.flow_counter);
        self.flow_counter += 1;
        let idx = self.samplex.add_node(Node::Copy(CopyNode {
            register: name.to_string(),
            output: copy_name.clone(),
            kind,
            num_subsystems,
        }))?;
        self.read_edge(name, idx);
        self.last_writer.insert(copy_name.clone(), idx);
        Ok(copy_name)
    }

    fn lower_collect(&mut self, index: usize, record: CollectRecord) -> Result<()> {
        // Dressing product order: the box's own samples first, then claimed
        // arrivals in reverse claim order (the later a register arrived in
        // circuit time, the closer it sits to the samples).
        let contributions: Vec<Contribution> = record
            .contributions
            .into_iter()
            .sorted_by_key(|contribution| {
                (!contribution.own, std::cmp::Reverse(contribution.order))
            })
            .collect();

        let mut operands = Vec::new();
        for contribution in &contributions {
            let (name, rows, kind) = self.lower_flow(&contribution.source, &contribution.ops)?;
            let mapping: Vec<(usize, usize)> = contribution
                .qubits
                .iter()
                .map(|qubit| {
                    let src = rows
                        .iter()
                        .position(|&row| row == *qubit)
                        .expect("claimed qubits are rows of the source register");
                    let dst = record
                        .rows
                        .iter()
                        .position(|&row| row == *qubit)
                        .expect("claimed qubits are rows of the dressing");
                    (src, dst)
                })
                .collect();
            operands.push((name, kind, mapping));
        }

        let dressing = format!("dressing{index}");
        let combine_idx = self
            .samplex
            .add_node(Node::CombineRegisters(CombineRegistersNode {
                output: dressing.clone(),
                output_kind: VirtualKind::U2,
                num_subsystems: record.rows.len(),
                operands: operands
                    .iter()
                    .map(|(name, kind, mapping)| CombineOperand {
                        register: name.clone(),
                        kind: *kind,
                        mapping: mapping.clone(),
                    })
                    .collect(),
            }))?;
        for (name, _, _) in &operands {
            self.read_edge(name, combine_idx);
        }
        self.last_writer.insert(dressing.clone(), combine_idx);

        for op in &record.dress_ops {
            let idx = match op {
                DressOp::Word { word, qubits, side } => {
                    let subsystems: Vec<usize> = qubits
                        .iter()
                        .map(|qubit| {
                            record
                                .rows
                                .iter()
                                .position(|&row| row == *qubit)
                                .expect("dress words act on dressing rows")
                        })
                        .collect();
                    self.samplex.add_node(Node::U2ParametricMultiplication(
                        U2ParametricMultiplicationNode {
                            register: dressing.clone(),
                            side: *side,
                            word: word.clone(),
                            subsystems,
                        },
                    ))?
                }
                DressOp::Basis {
                    input_name,
                    source_kind,
                    side,
                } => self.samplex.add_node(Node::ChangeBasis(ChangeBasisNode {
                    register: dressing.clone(),
                    input_name: input_name.clone(),
                    source_kind: *source_kind,
                    side: *side,
                    subsystems: (0..record.rows.len()).collect(),
                }))?,
            };
            self.read_edge(&dressing, idx);
            self.last_writer.insert(dressing.clone(), idx);
        }

        let collect_idx = self
            .samplex
            .add_node(Node::CollectTemplateValues(CollectTemplateValues {
                register: dressing.clone(),
                register_kind: VirtualKind::U2,
                synth: record.synth,
                subsystems: (0..record.rows.len()).collect(),
                template_idxs: record.param_idxs.clone(),
            }))?;
        self.read_edge(&dressing, collect_idx);

        let max_param = record.param_idxs.iter().copied().max().map_or(0, |m| m + 1);
        self.samplex.set_num_template_params(max_param);
        Ok(())
    }

    fn lower_z2(&mut self, record: Z2Record) -> Result<()> {
        let (name, rows, _kind) = self.lower_flow(&record.source, &record.ops)?;
        let subsystems: Vec<usize> = if record.qubits.is_empty() {
            (0..rows.len().max(1)).collect()
        } else {
            record
                .qubits
                .iter()
                .map(|qubit| {
                    rows.iter()
                        .position(|&row| row == *qubit)
                        .expect("collected qubits are rows of the source register")
                })
                .collect()
        };
        let idx = self
            .samplex
            .add_node(Node::CollectZ2ToOutput(CollectZ2ToOutputNode {
                register: name.clone(),
                subsystems,
                output: record.output,
                positions: record.positions,
            }))?;
        self.read_edge(&name, idx);
        Ok(())
    }
}
