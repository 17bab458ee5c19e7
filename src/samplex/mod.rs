//! The samplex: a finalized, executable sampling program.
//!
//! A samplex is a DAG of typed nodes over named virtual registers. Sampling
//! nodes instantiate registers, evaluation nodes transform them, and
//! collection nodes turn them into output tensors. `finalize` partitions the
//! graph into a sampling batch, an ordered list of evaluation streams (the
//! topological generations of the evaluation subgraph), and a collection
//! batch; `sample` then runs the three phases with bounded parallelism and a
//! barrier between consecutive streams.
//!
//! Determinism: each sampling and collection node gets its own child RNG
//! seeded from the master generator in node order, and all effects are
//! applied at barriers in node order, so for a fixed seed and input the
//! output is bit-identical regardless of the worker count.

pub mod nodes;

use std::collections::{BTreeMap, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

use crate::error::{Error, Result, SamplexConstructionError, SamplexRuntimeError};
use crate::graph_utils::topological_generations;
use crate::noise::NoiseRequirement;
use crate::params::ParameterExpressionTable;
use crate::tensor::{Dtype, SamplexOutput, Tensor, TensorInterface, TensorSpec};

use nodes::{Node, NodeRole, OutputWrite, RegisterMap, RegisterWrite};

/// Options of a single [`Samplex::sample`] call.
#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Seed of the master randomness generator.
    pub seed: u64,
    /// Maximum number of worker threads; `None` uses the global pool.
    pub max_workers: Option<usize>,
    /// Whether to retain the register map in the output.
    pub keep_registers: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            max_workers: None,
            keep_registers: false,
        }
    }
}

/// Performs sampling and parameter generation for a template circuit.
#[derive(Debug, Clone, Default)]
pub struct Samplex {
    graph: StableDiGraph<Node, ()>,
    finalized: bool,
    param_table: ParameterExpressionTable,
    /// `(template parameter index, expression index)` pairs evaluated once
    /// and broadcast over randomizations.
    passthrough: Vec<(usize, usize)>,
    input_specs: BTreeMap<String, TensorSpec>,
    output_specs: BTreeMap<String, TensorSpec>,
    noise_requirements: BTreeMap<String, NoiseRequirement>,
    num_template_params: usize,
    sampling_nodes: Vec<NodeIndex>,
    evaluation_streams: Vec<Vec<NodeIndex>>,
    collection_nodes: Vec<NodeIndex>,
}

impl Samplex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of template circuit parameters this samplex produces
    /// values for.
    pub fn num_template_params(&self) -> usize {
        self.num_template_params
    }

    pub fn set_num_template_params(&mut self, count: usize) {
        self.num_template_params = self.num_template_params.max(count);
    }

    /// The sorted names of circuit parameters expecting values at sampling
    /// time.
    pub fn parameters(&self) -> Vec<String> {
        self.param_table.parameters()
    }

    pub fn num_parameters(&self) -> usize {
        self.param_table.num_parameters()
    }

    pub fn param_table(&self) -> &ParameterExpressionTable {
        &self.param_table
    }

    /// Adds a parameter expression, returning its table index. An expression
    /// must be added before a node referencing its index.
    pub fn append_parameter_expression(&mut self, expression: crate::circuit::ParamExpr) -> usize {
        self.param_table.append(expression)
    }

    /// Sets the mapping for parameters that are not influenced by virtual
    /// gate propagation: they map straight from circuit expressions to
    /// template parameters.
    pub fn set_passthrough_params(&mut self, passthrough: Vec<(usize, usize)>) {
        for &(template_idx, _) in &passthrough {
            self.num_template_params = self.num_template_params.max(template_idx + 1);
        }
        self.passthrough = passthrough;
    }

    pub fn passthrough_params(&self) -> &[(usize, usize)] {
        &self.passthrough
    }

    pub fn add_input(&mut self, spec: TensorSpec, overwrite: bool) -> Result<()> {
        if !overwrite && self.input_specs.contains_key(&spec.name) {
            return Err(SamplexConstructionError::DuplicateInput(spec.name).into());
        }
        self.input_specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn add_output(&mut self, spec: TensorSpec) -> Result<()> {
        if self.output_specs.contains_key(&spec.name) {
            return Err(SamplexConstructionError::DuplicateOutput(spec.name).into());
        }
        self.output_specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn add_noise_requirement(&mut self, requirement: NoiseRequirement) -> Result<()> {
        if self.noise_requirements.contains_key(&requirement.noise_ref) {
            return Err(
                SamplexConstructionError::DuplicateNoiseRequirement(requirement.noise_ref).into(),
            );
        }
        self.noise_requirements
            .insert(requirement.noise_ref.clone(), requirement);
        Ok(())
    }

    pub fn noise_requirements(&self) -> impl Iterator<Item = &NoiseRequirement> {
        self.noise_requirements.values()
    }

    pub fn input_specs(&self) -> impl Iterator<Item = &TensorSpec> {
        self.input_specs.values()
    }

    pub fn output_specs(&self) -> impl Iterator<Item = &TensorSpec> {
        self.output_specs.values()
    }

    /// Adds a node to the samplex graph, returning its index.
    pub fn add_node(&mut self, node: Node) -> Result<NodeIndex> {
        if self.finalized {
            return Err(SamplexConstructionError::Finalized.into());
        }
        let count = self.param_table.num_expressions();
        if let Some(&index) = node
            .parameter_indices()
            .iter()
            .find(|&&index| index >= count)
        {
            return Err(
                SamplexConstructionError::MissingParameterExpression { index, count }.into(),
            );
        }
        Ok(self.graph.add_node(node))
    }

    /// Adds a dependency edge between two nodes.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) -> Result<()> {
        if self.finalized {
            return Err(SamplexConstructionError::Finalized.into());
        }
        self.graph.add_edge(from, to, ());
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    pub fn edges(&self) -> Vec<(NodeIndex, NodeIndex)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Signals that all nodes and edges have been added: partitions the
    /// graph into the three execution phases, validates the register flow,
    /// and caches the plan.
    pub fn finalize(&mut self) -> Result<&mut Self> {
        let mut sampling_nodes = Vec::new();
        let mut collection_nodes = Vec::new();
        let mut cut_graph = self.graph.clone();
        let mut node_indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        node_indices.sort_unstable();
        for node_idx in node_indices {
            match self.graph[node_idx].role() {
                NodeRole::Sampling => {
                    sampling_nodes.push(node_idx);
                    cut_graph.remove_node(node_idx);
                }
                NodeRole::Collection => {
                    collection_nodes.push(node_idx);
                    cut_graph.remove_node(node_idx);
                }
                NodeRole::Evaluation => {}
            }
        }

        self.evaluation_streams = topological_generations(&cut_graph);
        self.sampling_nodes = sampling_nodes;
        self.collection_nodes = collection_nodes;

        self.validate_evaluation_strategy()?;
        self.finalized = true;
        Ok(self)
    }

    fn validate_evaluation_strategy(&self) -> Result<()> {
        let mut descriptions = HashMap::new();
        for &node_idx in &self.sampling_nodes {
            self.graph[node_idx].validate_and_update(&mut descriptions)?;
        }
        for stream in &self.evaluation_streams {
            for &node_idx in stream {
                self.graph[node_idx].validate_and_update(&mut descriptions)?;
            }
        }
        for &node_idx in &self.collection_nodes {
            self.graph[node_idx].validate_and_update(&mut descriptions)?;
        }
        Ok(())
    }

    /// The input bundle this samplex requires, with every specification
    /// present but unbound.
    pub fn inputs(&self) -> TensorInterface {
        let mut specs: Vec<TensorSpec> = self.input_specs.values().cloned().collect();
        let num_parameters = self.param_table.num_parameters();
        let mut parameter_spec =
            TensorSpec::new("parameter_values", &[num_parameters], Dtype::F64)
                .describe("Values of the free circuit parameters, in sorted name order.");
        if num_parameters == 0 {
            parameter_spec = parameter_spec.with_default(Tensor::from_f64_slice(&[]));
        }
        specs.push(parameter_spec);
        TensorInterface::new(specs)
    }

    /// The promised output bundle of a `sample` call for the given number
    /// of randomizations, allocated but unfilled.
    pub fn outputs(&self, num_randomizations: usize) -> SamplexOutput {
        SamplexOutput::allocate(self.output_layout(), num_randomizations)
    }

    /// The output specifications of a `sample` call, without the leading
    /// randomizations axis.
    fn output_layout(&self) -> Vec<TensorSpec> {
        let mut specs: Vec<TensorSpec> = self.output_specs.values().cloned().collect();
        specs.push(
            TensorSpec::new(
                "parameter_values",
                &[self.num_template_params],
                Dtype::F64,
            )
            .describe("One row of template parameter values per randomization."),
        );
        specs
    }

    /// Draws `num_randomizations` randomizations, producing the output
    /// bundle.
    pub fn sample(
        &self,
        input: &TensorInterface,
        num_randomizations: usize,
        options: &SampleOptions,
    ) -> Result<SamplexOutput> {
        if !self.finalized {
            return Err(SamplexRuntimeError::NotFinalized.into());
        }
        let missing = input.missing();
        if !missing.is_empty() {
            return Err(SamplexRuntimeError::MissingInputs(missing.join(", ")).into());
        }

        let parameter_values: Vec<f64> = input
            .get("parameter_values")
            .and_then(|tensor| tensor.as_f64())
            .map(|array| array.iter().copied().collect())
            .unwrap_or_default();
        let evaluated = self.param_table.evaluate(&parameter_values)?;

        let mut output = SamplexOutput::allocate(self.output_layout(), num_randomizations);
        if let Some(tensor) = output.get_mut("parameter_values")
            && let Some(array) = tensor.as_f64_mut()
        {
            for &(template_idx, expression_idx) in &self.passthrough {
                for randomization in 0..num_randomizations {
                    array[[randomization, template_idx]] = evaluated[expression_idx];
                }
            }
        }

        // Child RNGs are seeded in node order before any parallelism so the
        // drawing is independent of thread interleaving.
        let mut master = StdRng::seed_from_u64(options.seed);
        let mut child_seed = || {
            let mut seed = [0u8; 32];
            master.fill_bytes(&mut seed);
            seed
        };
        let sampling_seeds: Vec<[u8; 32]> =
            self.sampling_nodes.iter().map(|_| child_seed()).collect();
        let collection_seeds: Vec<[u8; 32]> =
            self.collection_nodes.iter().map(|_| child_seed()).collect();

        let mut registers = RegisterMap::new();
        let run = |work: &mut (dyn FnMut() -> Result<()> + Send)| -> Result<()> {
            match options.max_workers {
                Some(workers) => rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|err| SamplexRuntimeError::WorkerPool(err.to_string()))?
                    .install(|| work()),
                None => work(),
            }
        };

        run(&mut || {
            // sampling phase
            let sampled: std::result::Result<Vec<Vec<(String, _)>>, Error> = self
                .sampling_nodes
                .par_iter()
                .zip(sampling_seeds.par_iter())
                .map(|(&node_idx, seed)| {
                    let mut rng = StdRng::from_seed(*seed);
                    self.graph[node_idx].sample(&mut rng, input, num_randomizations)
                })
                .collect();
            for (name, register) in sampled?.into_iter().flatten() {
                registers.insert(name, register);
            }

            // evaluation phase, one stream at a time
            for stream in &self.evaluation_streams {
                let writes: std::result::Result<Vec<Vec<RegisterWrite>>, Error> = stream
                    .par_iter()
                    .map(|&node_idx| self.graph[node_idx].evaluate(&registers, input, &evaluated))
                    .collect();
                for write in writes?.into_iter().flatten() {
                    apply_register_write(&mut registers, write)?;
                }
            }

            // collection phase
            let collected: std::result::Result<Vec<Vec<OutputWrite>>, Error> = self
                .collection_nodes
                .par_iter()
                .zip(collection_seeds.par_iter())
                .map(|(&node_idx, seed)| {
                    let mut rng = StdRng::from_seed(*seed);
                    self.graph[node_idx].collect(&registers, &mut rng)
                })
                .collect();
            for write in collected?.into_iter().flatten() {
                apply_output_write(&mut output, write);
            }
            Ok(())
        })?;

        if options.keep_registers {
            output.registers = Some(registers);
        }
        Ok(output)
    }
}

fn apply_register_write(registers: &mut RegisterMap, write: RegisterWrite) -> Result<()> {
    match write {
        RegisterWrite::Replace { name, register } => {
            registers.insert(name, register);
        }
        RegisterWrite::Assign {
            name,
            subsystems,
            values,
        } => {
            let register = registers
                .get_mut(&name)
                .ok_or_else(|| SamplexRuntimeError::RegisterNotFound(name.clone()))?;
            register.assign(&subsystems, &values)?;
        }
    }
    Ok(())
}

fn apply_output_write(output: &mut SamplexOutput, write: OutputWrite) {
    match write {
        OutputWrite::TemplateValues {
            template_idxs,
            values,
        } => {
            let Some(array) = output
                .get_mut("parameter_values")
                .and_then(Tensor::as_f64_mut)
            else {
                return;
            };
            let num_randomizations = array.shape()[0];
            let value_randomizations = values.shape()[1];
            for subsystem in 0..template_idxs.nrows() {
                for param in 0..template_idxs.ncols() {
                    let template_idx = template_idxs[(subsystem, param)];
                    for randomization in 0..num_randomizations {
                        let column = if value_randomizations == 1 {
                            0
                        } else {
                            randomization
                        };
                        array[[randomization, template_idx]] =
                            values[(subsystem, column, param)];
                    }
                }
            }
        }
        OutputWrite::Flips {
            output: name,
            positions,
            bits,
        } => {
            let Some(array) = output.get_mut(&name).and_then(Tensor::as_bool_mut) else {
                return;
            };
            let num_randomizations = array.shape()[0];
            for (row, &position) in positions.iter().enumerate() {
                for randomization in 0..num_randomizations {
                    let column = if bits.ncols() == 1 { 0 } else { randomization };
                    array[[randomization, position]] ^= bits[(row, column)];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synths::Synth;
    use ndarray::array;
    use super::nodes::{CollectTemplateValues, TwirlSamplingNode};
    use virtual_registers::distributions::UniformPauli;
    use virtual_registers::registers::VirtualKind;

    fn twirl_samplex() -> Samplex {
        let mut samplex = Samplex::new();
        samplex.set_num_template_params(6);
        let sampling = samplex
            .add_node(Node::TwirlSampling(TwirlSamplingNode {
                lhs_register: "lhs".into(),
                rhs_register: "rhs".into(),
                distribution: UniformPauli::new(2).into(),
            }))
            .unwrap();
        let collect = samplex
            .add_node(Node::CollectTemplateValues(CollectTemplateValues {
                register: "lhs".into(),
                register_kind: VirtualKind::Pauli,
                synth: Synth::RzRx,
                subsystems: vec![0, 1],
                template_idxs: array![[0, 1, 2], [3, 4, 5]],
            }))
            .unwrap();
        samplex.add_edge(sampling, collect).unwrap();
        samplex
    }

    #[test]
    fn sampling_requires_finalization() {
        let samplex = twirl_samplex();
        let inputs = samplex.inputs();
        let result = samplex.sample(&inputs, 3, &SampleOptions::default());
        assert!(matches!(
            result,
            Err(Error::Runtime(SamplexRuntimeError::NotFinalized))
        ));
    }

    #[test]
    fn empty_samplex_produces_an_empty_bundle() {
        let mut samplex = Samplex::new();
        samplex.finalize().unwrap();
        let inputs = samplex.inputs();
        let output = samplex
            .sample(&inputs, 7, &SampleOptions::default())
            .unwrap();
        assert_eq!(
            output.get("parameter_values").unwrap().shape(),
            &[7usize, 0]
        );
    }

    #[test]
    fn validation_rejects_reads_of_unknown_registers() {
        let mut samplex = Samplex::new();
        samplex.set_num_template_params(3);
        samplex
            .add_node(Node::CollectTemplateValues(CollectTemplateValues {
                register: "ghost".into(),
                register_kind: VirtualKind::Pauli,
                synth: Synth::RzRx,
                subsystems: vec![0],
                template_idxs: array![[0, 1, 2]],
            }))
            .unwrap();
        assert!(matches!(
            samplex.finalize(),
            Err(Error::Construction(
                SamplexConstructionError::MissingRegister(_)
            ))
        ));
    }

    #[test]
    fn determinism_across_worker_counts() {
        let mut samplex = twirl_samplex();
        samplex.finalize().unwrap();
        let inputs = samplex.inputs();

        let mut outputs = Vec::new();
        for workers in [1, 2, 8] {
            let options = SampleOptions {
                seed: 99,
                max_workers: Some(workers),
                keep_registers: false,
            };
            outputs.push(samplex.sample(&inputs, 40, &options).unwrap());
        }
        let reference = outputs[0].get("parameter_values").unwrap();
        for output in &outputs[1..] {
            assert_eq!(output.get("parameter_values").unwrap(), reference);
        }
    }

    #[test]
    fn keep_registers_retains_the_map() {
        let mut samplex = twirl_samplex();
        samplex.finalize().unwrap();
        let inputs = samplex.inputs();
        let options = SampleOptions {
            keep_registers: true,
            ..SampleOptions::default()
        };
        let output = samplex.sample(&inputs, 2, &options).unwrap();
        let registers = output.registers.as_ref().unwrap();
        assert!(registers.contains_key("lhs"));
        assert!(registers.contains_key("rhs"));
    }

    #[test]
    fn nodes_cannot_be_added_after_finalize() {
        let mut samplex = twirl_samplex();
        samplex.finalize().unwrap();
        let result = samplex.add_node(Node::TwirlSampling(TwirlSamplingNode {
            lhs_register: "x".into(),
            rhs_register: "y".into(),
            distribution: UniformPauli::new(1).into(),
        }));
        assert!(matches!(
            result,
            Err(Error::Construction(SamplexConstructionError::Finalized))
        ));
    }
}
