use ndarray::Array2;

use crate::error::Result;
use crate::registers::{bcast, check_inplace, check_subsystems, product_columns};

use super::PauliRegister;

/// Virtual register of sign bits, one per subsystem. The group operation is
/// XOR and every element is its own inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Z2Register {
    bits: Array2<bool>,
}

impl Z2Register {
    pub fn new(bits: Array2<bool>) -> Self {
        Self { bits }
    }

    pub fn identity(num_subsystems: usize, num_randomizations: usize) -> Self {
        Self {
            bits: Array2::from_elem((num_subsystems, num_randomizations), false),
        }
    }

    pub fn num_subsystems(&self) -> usize {
        self.bits.nrows()
    }

    pub fn num_randomizations(&self) -> usize {
        self.bits.ncols()
    }

    pub fn bits(&self) -> &Array2<bool> {
        &self.bits
    }

    pub fn bits_mut(&mut self) -> &mut Array2<bool> {
        &mut self.bits
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

    pub fn multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        let rows = self.rows(subsystems)?;
        let columns = product_columns(
            "z2 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        let bits = Array2::from_shape_fn((rows.len(), columns), |(i, j)| {
            self.bits[(rows[i], bcast(j, self.num_randomizations()))]
                ^ other.bits[(bcast(i, other.num_subsystems()), bcast(j, other.num_randomizations()))]
        });
        Ok(Self { bits })
    }

    pub fn left_multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        self.multiply(other, subsystems)
    }

    pub fn inplace_multiply(&mut self, other: &Self, subsystems: Option<&[usize]>) -> Result<()> {
        let rows = self.rows(subsystems)?;
        check_inplace(
            "z2 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        for (i, &row) in rows.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                self.bits[(row, j)] ^= other.bits[(
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

    pub fn invert(&self) -> Self {
        self.clone()
    }

    pub fn slice(&self, subsystems: &[usize]) -> Result<Self> {
        check_subsystems(subsystems, self.num_subsystems())?;
        let bits = Array2::from_shape_fn(
            (subsystems.len(), self.num_randomizations()),
            |(i, j)| self.bits[(subsystems[i], j)],
        );
        Ok(Self { bits })
    }

    pub fn assign(&mut self, subsystems: &[usize], values: &Self) -> Result<()> {
        check_subsystems(subsystems, self.num_subsystems())?;
        check_inplace(
            "z2 assign",
            (subsystems.len(), self.num_randomizations()),
            (values.num_subsystems(), values.num_randomizations()),
        )?;
        for (i, &row) in subsystems.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                self.bits[(row, j)] = values.bits[(
                    bcast(i, values.num_subsystems()),
                    bcast(j, values.num_randomizations()),
                )];
            }
        }
        Ok(())
    }

    /// The Pauli register mapping `false` to the identity and `true` to X.
    pub(crate) fn to_pauli(&self) -> PauliRegister {
        PauliRegister::new(self.bits.mapv(|bit| if bit { 2 } else { 0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn multiply_is_xor() {
        let lhs = Z2Register::new(array![[false, true], [true, true]]);
        let rhs = Z2Register::new(array![[true, true], [true, false]]);
        let product = lhs.multiply(&rhs, None).unwrap();
        assert_eq!(product.bits(), &array![[true, false], [false, true]]);
    }

    #[test]
    fn elements_are_self_inverse() {
        let reg = Z2Register::new(array![[true, false]]);
        let product = reg.multiply(&reg.invert(), None).unwrap();
        assert_eq!(product, Z2Register::identity(1, 2));
    }

    #[test]
    fn conversion_to_pauli_maps_true_to_x() {
        let reg = Z2Register::new(array![[false, true]]);
        assert_eq!(reg.to_pauli().gates(), &array![[0, 2]]);
    }
}
