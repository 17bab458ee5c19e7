use ndarray::{Array4, s};
use num_complex::Complex64;

use crate::error::Result;
use crate::registers::{bcast, check_inplace, check_subsystems, product_columns};
use crate::tables::Mat2;

/// Virtual register of arbitrary single-qubit unitaries, stored as one
/// 2 x 2 complex matrix per `(subsystem, randomization)` pair.
///
/// U2 is the terminal kind of the conversion graph: every other kind can be
/// lowered into it, but a U2 register cannot be converted back.
#[derive(Debug, Clone, PartialEq)]
pub struct U2Register {
    gates: Array4<Complex64>,
}

impl U2Register {
    /// Constructs a register from a `(subsystems, randomizations, 2, 2)`
    /// array of matrices.
    pub fn new(gates: Array4<Complex64>) -> Self {
        let shape = gates.shape();
        assert_eq!((shape[2], shape[3]), (2, 2), "elements must be 2 x 2 matrices");
        Self { gates }
    }

    pub fn identity(num_subsystems: usize, num_randomizations: usize) -> Self {
        Self::from_matrix_fn(num_subsystems, num_randomizations, |_, _| {
            [
                [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
                [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            ]
        })
    }

    /// Builds a register by evaluating a matrix for every element.
    pub fn from_matrix_fn(
        num_subsystems: usize,
        num_randomizations: usize,
        mut matrix: impl FnMut(usize, usize) -> Mat2,
    ) -> Self {
        let mut gates = Array4::zeros((num_subsystems, num_randomizations, 2, 2));
        for i in 0..num_subsystems {
            for j in 0..num_randomizations {
                let mat = matrix(i, j);
                for row in 0..2 {
                    for col in 0..2 {
                        gates[(i, j, row, col)] = mat[row][col];
                    }
                }
            }
        }
        Self { gates }
    }

    /// A register holding the same matrix for every subsystem, with a single
    /// randomization column for broadcasting.
    pub fn broadcast_matrix(matrix: Mat2, num_subsystems: usize) -> Self {
        Self::from_matrix_fn(num_subsystems, 1, |_, _| matrix)
    }

    pub fn num_subsystems(&self) -> usize {
        self.gates.shape()[0]
    }

    pub fn num_randomizations(&self) -> usize {
        self.gates.shape()[1]
    }

    pub fn gates(&self) -> &Array4<Complex64> {
        &self.gates
    }

    /// The matrix at one grid position.
    pub fn matrix(&self, subsystem: usize, randomization: usize) -> Mat2 {
        let mut mat = [[Complex64::new(0.0, 0.0); 2]; 2];
        for row in 0..2 {
            for col in 0..2 {
                mat[row][col] = self.gates[(subsystem, randomization, row, col)];
            }
        }
        mat
    }

    fn set_matrix(&mut self, subsystem: usize, randomization: usize, mat: &Mat2) {
        for row in 0..2 {
            for col in 0..2 {
                self.gates[(subsystem, randomization, row, col)] = mat[row][col];
            }
        }
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

    fn product(
        &self,
        other: &Self,
        subsystems: Option<&[usize]>,
        other_on_left: bool,
    ) -> Result<Self> {
        let rows = self.rows(subsystems)?;
        let columns = product_columns(
            "u2 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        let mut out = Self {
            gates: Array4::zeros((rows.len(), columns, 2, 2)),
        };
        for (i, &row) in rows.iter().enumerate() {
            for j in 0..columns {
                let lhs = self.matrix(row, bcast(j, self.num_randomizations()));
                let rhs = other.matrix(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                );
                let product = if other_on_left {
                    mat_mul(&rhs, &lhs)
                } else {
                    mat_mul(&lhs, &rhs)
                };
                out.set_matrix(i, j, &product);
            }
        }
        Ok(out)
    }

    /// The matrix product `self * other` over the selected rows.
    pub fn multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        self.product(other, subsystems, false)
    }

    /// The matrix product `other * self` over the selected rows.
    pub fn left_multiply(&self, other: &Self, subsystems: Option<&[usize]>) -> Result<Self> {
        self.product(other, subsystems, true)
    }

    fn inplace_product(
        &mut self,
        other: &Self,
        subsystems: Option<&[usize]>,
        other_on_left: bool,
    ) -> Result<()> {
        let rows = self.rows(subsystems)?;
        check_inplace(
            "u2 multiply",
            (rows.len(), self.num_randomizations()),
            (other.num_subsystems(), other.num_randomizations()),
        )?;
        for (i, &row) in rows.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                let lhs = self.matrix(row, j);
                let rhs = other.matrix(
                    bcast(i, other.num_subsystems()),
                    bcast(j, other.num_randomizations()),
                );
                let product = if other_on_left {
                    mat_mul(&rhs, &lhs)
                } else {
                    mat_mul(&lhs, &rhs)
                };
                self.set_matrix(row, j, &product);
            }
        }
        Ok(())
    }

    pub fn inplace_multiply(&mut self, other: &Self, subsystems: Option<&[usize]>) -> Result<()> {
        self.inplace_product(other, subsystems, false)
    }

    pub fn left_inplace_multiply(
        &mut self,
        other: &Self,
        subsystems: Option<&[usize]>,
    ) -> Result<()> {
        self.inplace_product(other, subsystems, true)
    }

    /// The elementwise inverse: the conjugate transpose of each unitary.
    pub fn invert(&self) -> Self {
        let mut out = self.clone();
        for i in 0..self.num_subsystems() {
            for j in 0..self.num_randomizations() {
                let mat = self.matrix(i, j);
                out.set_matrix(
                    i,
                    j,
                    &[
                        [mat[0][0].conj(), mat[1][0].conj()],
                        [mat[0][1].conj(), mat[1][1].conj()],
                    ],
                );
            }
        }
        out
    }

    pub fn slice(&self, subsystems: &[usize]) -> Result<Self> {
        check_subsystems(subsystems, self.num_subsystems())?;
        let mut gates = Array4::zeros((subsystems.len(), self.num_randomizations(), 2, 2));
        for (i, &row) in subsystems.iter().enumerate() {
            gates
                .slice_mut(s![i, .., .., ..])
                .assign(&self.gates.slice(s![row, .., .., ..]));
        }
        Ok(Self { gates })
    }

    pub fn assign(&mut self, subsystems: &[usize], values: &Self) -> Result<()> {
        check_subsystems(subsystems, self.num_subsystems())?;
        check_inplace(
            "u2 assign",
            (subsystems.len(), self.num_randomizations()),
            (values.num_subsystems(), values.num_randomizations()),
        )?;
        for (i, &row) in subsystems.iter().enumerate() {
            for j in 0..self.num_randomizations() {
                let mat = values.matrix(
                    bcast(i, values.num_subsystems()),
                    bcast(j, values.num_randomizations()),
                );
                self.set_matrix(row, j, &mat);
            }
        }
        Ok(())
    }
}

fn mat_mul(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = [[Complex64::new(0.0, 0.0); 2]; 2];
    for row in 0..2 {
        for col in 0..2 {
            out[row][col] = a[row][0] * b[0][col] + a[row][1] * b[1][col];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn invert_then_multiply_is_identity() {
        let f = std::f64::consts::FRAC_1_SQRT_2;
        let hadamard = [
            [Complex64::new(f, 0.0), Complex64::new(f, 0.0)],
            [Complex64::new(f, 0.0), Complex64::new(-f, 0.0)],
        ];
        let reg = U2Register::broadcast_matrix(hadamard, 3);
        let product = reg.multiply(&reg.invert(), None).unwrap();
        let identity = U2Register::identity(3, 1);
        for (lhs, rhs) in product.gates().iter().zip(identity.gates().iter()) {
            assert_abs_diff_eq!(lhs.re, rhs.re, epsilon = 1e-12);
            assert_abs_diff_eq!(lhs.im, rhs.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn left_multiply_reverses_operand_order() {
        let x = [
            [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
        ];
        let z = [
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
            [Complex64::new(0.0, 0.0), Complex64::new(-1.0, 0.0)],
        ];
        let reg_x = U2Register::broadcast_matrix(x, 1);
        let reg_z = U2Register::broadcast_matrix(z, 1);
        let zx = reg_x.left_multiply(&reg_z, None).unwrap();
        let xz = reg_x.multiply(&reg_z, None).unwrap();
        // ZX = -XZ for these anticommuting matrices
        for (lhs, rhs) in zx.gates().iter().zip(xz.gates().iter()) {
            assert_abs_diff_eq!(lhs.re, -rhs.re, epsilon = 1e-12);
            assert_abs_diff_eq!(lhs.im, -rhs.im, epsilon = 1e-12);
        }
    }
}
