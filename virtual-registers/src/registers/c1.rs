use ndarray::Array2;

use crate::error::{Error, Result};
use crate::registers::{VirtualKind, bcast, check_inplace, check_subsystems, product_columns};
use crate::tables::{C1_CATALOG, NUM_C1};

use super::U2Register;

/// Virtual register of single-qubit Clifford gates.
///
/// Elements are indices into the canonical 24-element catalog of symplectic
/// tableaus of the form `x | z | phase`; composition and inversion go through
/// the precomputed group tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C1Register {
    gates: Array2<u8>,
}

impl C1Register {
    /// Constructs a register from catalog indices.
    pub fn new(gates: Array2<u8>) -> Result<Self> {
        if let Some(&value) = gates.iter().find(|&&value| value >= NUM_C1 as u8) {
            return Err(Error::InvalidElement(value, VirtualKind::C1));
        }
        Ok(Self { gates })
    }

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

    /// The raw catalog index grid.
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

    pub fn multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        let rows = self.rows(subsystems)?;
        let columns = product_columns(
            "c1 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        let gates = Array2::from_shape_fn((rows.len(), columns), |(i, j)| {
            C1_CATALOG.multiply(
                self.gates[(rows[i], bcast(j, self.num_randomizations()))],
                other.gates[(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                )],
            )
        });
        Ok(Self { gates })
    }

    pub fn left_multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        let rows = self.rows(subsystems)?;
        let columns = product_columns(
            "c1 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        let gates = Array2::from_shape_fn((rows.len(), columns), |(i, j)| {
            C1_CATALOG.multiply(
                other.gates[(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                )],
                self.gates[(rows[i], bcast(j, self.num_randomizations()))],
            )
        });
        Ok(Self { gates })
    }

    pub fn inplace_multiply(&mut self, other: &Self, subsystems: Option<&[usize]>) -> Result<()> {
        let rows = self.rows(subsystems)?;
        check_inplace(
            "c1 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        for (i, &row) in rows.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                let rhs = other.gates[(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                )];
                self.gates[(row, j)] = C1_CATALOG.multiply(self.gates[(row, j)], rhs);
            }
        }
        Ok(())
    }

    pub fn left_inplace_multiply(
        &mut self,
        other: &Self,
        subsystems: Option<&[usize]>,
    ) -> Result<()> {
        let rows = self.rows(subsystems)?;
        check_inplace(
            "c1 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        for (i, &row) in rows.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                let lhs = other.gates[(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                )];
                self.gates[(row, j)] = C1_CATALOG.multiply(lhs, self.gates[(row, j)]);
            }
        }
        Ok(())
    }

    pub fn invert(&self) -> Self {
        Self {
            gates: self.gates.mapv(|idx| C1_CATALOG.invert(idx)),
        }
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
            "c1 assign",
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

    /// The U2 register of the corresponding unitary matrices.
    pub(crate) fn to_u2(&self) -> U2Register {
        U2Register::from_matrix_fn(
            self.num_subsystems(),
            self.num_randomizations(),
            |i, j| *C1_CATALOG.matrix(self.gates[(i, j)]),
        )
    }
}
