use ndarray::Array2;

use crate::error::Result;
use crate::registers::{bcast, check_inplace, check_subsystems, product_columns};
use crate::tables::pauli_matrix;

use super::{U2Register, Z2Register};

/// Phase exponents for Pauli products: `P_a * P_b = i^k * P_(a xor b)` with
/// the matrix convention `I = 0, Z = 1, X = 2, Y = 3`. Row-major in `(a, b)`.
const PHASE_EXPONENTS: [u8; 16] = [0, 0, 0, 0, 0, 0, 1, 3, 0, 3, 0, 1, 0, 1, 3, 0];

/// The power of `i` produced by the matrix product `P_a * P_b`.
pub fn pauli_phase_exponent(a: u8, b: u8) -> u8 {
    PHASE_EXPONENTS[(a & 3) as usize * 4 + (b & 3) as usize]
}

/// Virtual register of Pauli gates.
///
/// Elements are indices with the convention `I = 0, Z = 1, X = 2, Y = 3`, so
/// that the index bits are the `(x, z)` symplectic bits and projective
/// composition is a componentwise XOR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauliRegister {
    gates: Array2<u8>,
}

impl PauliRegister {
    /// Constructs a register from raw indices, reducing values mod 4.
    pub fn new(gates: Array2<u8>) -> Self {
        Self {
            gates: gates.mapv(|value| value & 3),
        }
    }

    /// The all-identity register.
    pub fn identity(num_subsystems: usize, num_randomizations: usize) -> Self {
        Self {
            gates: Array2::zeros((num_subsystems, num_randomizations)),
        }
    }

    pub fn num_subsystems(&self) -> usize {
        self.gates.nrows()
    }

    pub fn num_randomizations(&self) -> usize {
        self.gates.ncols()
    }

    /// The raw index grid.
    pub fn gates(&self) -> &Array2<u8> {
        &self.gates
    }

    pub fn gates_mut(&mut self) -> &mut Array2<u8> {
        &mut self.gates
    }

    fn rows(&self, subsystems: Option<&[usize]>) -> Result<Vec<usize>> {
        match subsystems {
            Some(idxs) => {
                check_subsystems(idxs, self.num_subsystems())?;
                Ok(idxs.to_vec())
            }
            None => Ok((0..self.num_subsystems()).collect()),
        }
    }

    /// The product `self * other` over the selected rows of `self`.
    pub fn multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        let rows = self.rows(subsystems)?;
        let columns = product_columns(
            "pauli multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        let gates = Array2::from_shape_fn((rows.len(), columns), |(i, j)| {
            self.gates[(rows[i], bcast(j, self.num_randomizations()))]
                ^ other.gates[(bcast(i, other.num_subsystems()), bcast(j, other.num_randomizations()))]
        });
        Ok(Self { gates })
    }

    /// The product `other * self` over the selected rows of `self`. Pauli
    /// composition is projectively abelian, so this matches `multiply`.
    pub fn left_multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        self.multiply(other, subsystems)
    }

    pub fn inplace_multiply(&mut self, other: &Self, subsystems: Option<&[usize]>) -> Result<()> {
        let rows = self.rows(subsystems)?;
        check_inplace(
            "pauli multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        for (i, &row) in rows.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                self.gates[(row, j)] ^= other.gates[(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                )];
            }
        }
        Ok(())
    }

    pub fn left_inplace_multiply(
        &mut self,
        other: &Self,
        subsystems: Option<&[usize]>,
    ) -> Result<()> {
        self.inplace_multiply(other, subsystems)
    }

    /// The elementwise inverse. Projective Paulis are involutions.
    pub fn invert(&self) -> Self {
        self.clone()
    }

    pub fn slice(&self, subsystems: &[usize]) -> Result<Self> {
        check_subsystems(subsystems, self.num_subsystems())?;
        let gates = Array2::from_shape_fn(
            (subsystems.len(), self.num_randomizations()),
            |(i, j)| self.gates[(subsystems[i], j)],
        );
        Ok(Self { gates })
    }

    pub fn assign(&mut self, subsystems: &[usize], values: &Self) -> Result<()> {
        check_subsystems(subsystems, self.num_subsystems())?;
        check_inplace(
            "pauli assign",
            (subsystems.len(), self.num_randomizations()),
            (values.num_subsystems(), values.num_randomizations()),
        )?;
        for (i, &row) in subsystems.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                self.gates[(row, j)] = values.gates[(
                    bcast(i, values.num_subsystems()),
                    bcast(j, values.num_randomizations()),
                )];
            }
        }
        Ok(())
    }

    /// The U2 register of the corresponding Pauli matrices.
    pub(crate) fn to_u2(&self) -> U2Register {
        U2Register::from_matrix_fn(
            self.num_subsystems(),
            self.num_randomizations(),
            |i, j| pauli_matrix(self.gates[(i, j)]),
        )
    }

    /// The Z2 register of x-bits: whether each Pauli flips a Z-basis
    /// measurement.
    pub(crate) fn to_z2(&self) -> Z2Register {
        Z2Register::new(self.gates.mapv(|value| value & 2 != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn multiply_is_xor_of_indices() {
        let lhs = PauliRegister::new(array![[0, 1, 2, 3]]);
        let rhs = PauliRegister::new(array![[2, 2, 2, 2]]);
        let product = lhs.multiply(&rhs, None).unwrap();
        assert_eq!(product.gates(), &array![[2, 3, 0, 1]]);
    }

    #[test]
    fn invert_then_multiply_is_identity() {
        let reg = PauliRegister::new(array![[0, 1], [2, 3]]);
        let product = reg.multiply(&reg.invert(), None).unwrap();
        assert_eq!(product, PauliRegister::identity(2, 2));
    }

    #[test]
    fn broadcast_over_randomizations() {
        let lhs = PauliRegister::new(array![[0, 1, 2]]);
        let rhs = PauliRegister::new(array![[1]]);
        let product = lhs.multiply(&rhs, None).unwrap();
        assert_eq!(product.gates(), &array![[1, 0, 3]]);
    }

    #[test]
    fn subsystem_selection_multiplies_a_subset() {
        let mut reg = PauliRegister::new(array![[0, 0], [1, 1], [2, 2]]);
        let operand = PauliRegister::new(array![[3, 3]]);
        reg.inplace_multiply(&operand, Some(&[1])).unwrap();
        assert_eq!(reg.gates(), &array![[0, 0], [2, 2], [2, 2]]);
    }

    #[test]
    fn phase_exponents_follow_the_symplectic_rule() {
        // Z * X = iY, X * Z = -iY, X * Y = iZ
        assert_eq!(pauli_phase_exponent(1, 2), 1);
        assert_eq!(pauli_phase_exponent(2, 1), 3);
        assert_eq!(pauli_phase_exponent(2, 3), 1);
        for pauli in 0..4 {
            assert_eq!(pauli_phase_exponent(pauli, pauli), 0);
            assert_eq!(pauli_phase_exponent(0, pauli), 0);
            assert_eq!(pauli_phase_exponent(pauli, 0), 0);
        }
    }

    #[test]
    fn conversion_to_z2_extracts_x_bits() {
        let reg = PauliRegister::new(array![[0, 1, 2, 3]]);
        let bits = reg.to_z2();
        assert_eq!(
            bits.bits().iter().copied().collect::<Vec<_>>(),
            vec![false, false, true, true]
        );
    }
}
