use ndarray::Array2;

use crate::error::{Error, SamplexRuntimeError};
use virtual_registers::registers::{C1Register, PauliRegister, VirtualKind, VirtualRegister};
use virtual_registers::tables::{
    Conjugation, c1_pair_entry, c1_past_one_qubit, c1_past_two_qubit, pauli_past_one_qubit,
    pauli_past_two_qubit,
};

use super::{Footprint, RegisterMap, RegisterWrite, lookup_register};

fn flatten(subsystems: &[Vec<usize>]) -> Vec<usize> {
    subsystems.iter().flatten().copied().collect()
}

/// Applies the fixed Pauli image map of a named Clifford gate, in place, to
/// the listed subsystem tuples of a Pauli register.
///
/// Each tuple holds either the two register subsystems sitting on the gate's
/// qubits (in operand order) or a single subsystem for a one-qubit gate.
#[derive(Debug, Clone)]
pub struct PauliPastCliffordNode {
    pub gate: String,
    pub register: String,
    pub subsystems: Vec<Vec<usize>>,
    pub conjugation: Conjugation,
}

impl PauliPastCliffordNode {
    pub fn footprint(&self) -> Vec<Footprint> {
        vec![(
            self.register.clone(),
            flatten(&self.subsystems),
            VirtualKind::Pauli,
        )]
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;
        let VirtualRegister::Pauli(paulis) = register else {
            return Err(SamplexRuntimeError::RegisterNotFound(self.register.clone()).into());
        };

        let rows = flatten(&self.subsystems);
        let num_randomizations = paulis.num_randomizations();
        let mut values = Array2::<u8>::zeros((rows.len(), num_randomizations));

        for tuple in &self.subsystems {
            match tuple.as_slice() {
                &[low, high] => {
                    let table = pauli_past_two_qubit(&self.gate, self.conjugation)?;
                    let low_out = rows.iter().position(|&row| row == low).unwrap();
                    let high_out = rows.iter().position(|&row| row == high).unwrap();
                    for column in 0..num_randomizations {
                        let (p0, p1) = (
                            paulis.gates()[(low, column)],
                            paulis.gates()[(high, column)],
                        );
                        let (q0, q1) = table[p0 as usize][p1 as usize];
                        values[(low_out, column)] = q0;
                        values[(high_out, column)] = q1;
                    }
                }
                &[single] => {
                    let table = pauli_past_one_qubit(&self.gate, self.conjugation)?;
                    let out = rows.iter().position(|&row| row == single).unwrap();
                    for column in 0..num_randomizations {
                        values[(out, column)] = table[paulis.gates()[(single, column)] as usize];
                    }
                }
                other => {
                    return Err(SamplexRuntimeError::NonLocalConjugation(format!(
                        "{:?} is not a valid subsystem tuple",
                        other
                    ))
                    .into());
                }
            }
        }

        Ok(vec![RegisterWrite::Assign {
            name: self.register.clone(),
            subsystems: rows,
            values: PauliRegister::new(values).into(),
        }])
    }
}

/// Applies the C1 image table of a named Clifford gate, in place, to the
/// listed subsystem tuples of a C1 register.
///
/// Raises a runtime error when a sampled pair falls on a sentinel entry of
/// the table, i.e. when the conjugation does not factorize locally.
#[derive(Debug, Clone)]
pub struct C1PastCliffordNode {
    pub gate: String,
    pub register: String,
    pub subsystems: Vec<Vec<usize>>,
    pub conjugation: Conjugation,
}

impl C1PastCliffordNode {
    pub fn footprint(&self) -> Vec<Footprint> {
        vec![(
            self.register.clone(),
            flatten(&self.subsystems),
            VirtualKind::C1,
        )]
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;
        let VirtualRegister::C1(cliffords) = register else {
            return Err(SamplexRuntimeError::RegisterNotFound(self.register.clone()).into());
        };

        let rows = flatten(&self.subsystems);
        let num_randomizations = cliffords.num_randomizations();
        let mut values = Array2::<u8>::zeros((rows.len(), num_randomizations));

        for tuple in &self.subsystems {
            match tuple.as_slice() {
                &[low, high] => {
                    let table = c1_past_two_qubit(&self.gate, self.conjugation)?;
                    let low_out = rows.iter().position(|&row| row == low).unwrap();
                    let high_out = rows.iter().position(|&row| row == high).unwrap();
                    for column in 0..num_randomizations {
                        let (c0, c1) = (
                            cliffords.gates()[(low, column)],
                            cliffords.gates()[(high, column)],
                        );
                        let (d0, d1) = c1_pair_entry(table, c0, c1).ok_or_else(|| {
                            SamplexRuntimeError::NonLocalConjugation(self.gate.clone())
                        })?;
                        values[(low_out, column)] = d0;
                        values[(high_out, column)] = d1;
                    }
                }
                &[single] => {
                    let table = c1_past_one_qubit(&self.gate, self.conjugation)?;
                    let out = rows.iter().position(|&row| row == single).unwrap();
                    for column in 0..num_randomizations {
                        values[(out, column)] =
                            table[cliffords.gates()[(single, column)] as usize];
                    }
                }
                other => {
                    return Err(SamplexRuntimeError::NonLocalConjugation(format!(
                        "{:?} is not a valid subsystem tuple",
                        other
                    ))
                    .into());
                }
            }
        }

        Ok(vec![RegisterWrite::Assign {
            name: self.register.clone(),
            subsystems: rows,
            values: C1Register::new(values)?.into(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn pauli_past_cx_maps_known_pairs() {
        let mut registers = RegisterMap::new();
        // columns: X(x)I, I(x)Z, Z(x)I, Y(x)Y
        registers.insert(
            "paulis".into(),
            PauliRegister::new(array![[2, 0, 1, 3], [0, 1, 0, 3]]).into(),
        );
        let node = PauliPastCliffordNode {
            gate: "cx".into(),
            register: "paulis".into(),
            subsystems: vec![vec![0, 1]],
            conjugation: Conjugation::ByGate,
        };
        let writes = node.evaluate(&registers).unwrap();
        let RegisterWrite::Assign { values, .. } = &writes[0] else {
            panic!("expected an assignment");
        };
        let VirtualRegister::Pauli(values) = values else {
            panic!("expected Pauli values");
        };
        // CX: X(x)I -> X(x)X, I(x)Z -> Z(x)Z, Z(x)I -> Z(x)I, Y(x)Y -> X(x)Z
        assert_eq!(values.gates(), &array![[2, 1, 1, 2], [2, 1, 0, 1]]);
    }

    #[test]
    fn c1_past_cx_keeps_paulis_local() {
        use virtual_registers::tables::C1_CATALOG;
        use virtual_registers::tableau::{Tableau, one_qubit_gate};

        // the X gate as a C1 catalog element
        let x_idx = C1_CATALOG.index_of(&one_qubit_gate("x").unwrap()).unwrap();
        let id_idx = C1_CATALOG.index_of(&Tableau::identity(1)).unwrap();

        let mut registers = RegisterMap::new();
        registers.insert(
            "cliffords".into(),
            C1Register::new(array![[x_idx], [id_idx]]).unwrap().into(),
        );
        let node = C1PastCliffordNode {
            gate: "cx".into(),
            register: "cliffords".into(),
            subsystems: vec![vec![0, 1]],
            conjugation: Conjugation::ByGate,
        };
        let writes = node.evaluate(&registers).unwrap();
        let RegisterWrite::Assign { values, .. } = &writes[0] else {
            panic!("expected an assignment");
        };
        let VirtualRegister::C1(values) = values else {
            panic!("expected C1 values");
        };
        // CX (X(x)I) CX = X(x)X
        assert_eq!(values.gates(), &array![[x_idx], [x_idx]]);
    }
}
