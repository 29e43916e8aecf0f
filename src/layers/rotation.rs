use burn::prelude::*;

use crate::layers::interpolation::NUM_ROTATIONS;


/// Source offset (row-major, within one `k × k` plane) feeding each
/// destination cell of the kernel rotated by `rotation · 90°` counter-clockwise.
pub fn rotation_indices(kernel_size: usize, rotation: usize) -> Vec<usize> {
    let k = kernel_size;
    let last = k - 1;

    (0..k)
        .flat_map(|h| (0..k).map(move |w| (h, w)))
        .map(|(h, w)| {
            let (src_h, src_w) = match rotation % NUM_ROTATIONS {
                0 => (h, w),
                1 => (w, last - h),
                2 => (last - h, last - w),
                _ => (last - w, h),
            };
            src_h * k + src_w
        })
        .collect()
}

/// Inverse of [`rotation_indices`]: destination cell each source cell lands on.
pub fn inverse_rotation_indices(kernel_size: usize, rotation: usize) -> Vec<usize> {
    let forward = rotation_indices(kernel_size, rotation);
    let mut inverse = vec![0; forward.len()];
    for (dst, &src) in forward.iter().enumerate() {
        inverse[src] = dst;
    }

    inverse
}

fn permute_planes<B: Backend>(kernel: Tensor<B, 4>, indices: &[usize]) -> Tensor<B, 4> {
    let [out_channels, in_channels, kernel_h, kernel_w] = kernel.dims();
    let device = kernel.device();

    let indices: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
    let indices = Tensor::<B, 1, Int>::from_ints(indices.as_slice(), &device);

    kernel
        .reshape([out_channels * in_channels, kernel_h * kernel_w])
        .select(1, indices)
        .reshape([out_channels, in_channels, kernel_h, kernel_w])
}


/// The four axis-aligned rotations of one learned kernel.
///
/// Every entry is a gather over the same parameter; nothing here owns or
/// mutates the kernel, and the bank is rebuilt from the current kernel on
/// every forward pass.
#[derive(Clone, Debug)]
pub struct RotatedKernelBank<B: Backend> {
    kernels: [Tensor<B, 4>; NUM_ROTATIONS],
}

impl<B: Backend> RotatedKernelBank<B> {
    pub fn build(kernel: Tensor<B, 4>) -> Self {
        let [_, _, kernel_h, kernel_w] = kernel.dims();
        debug_assert_eq!(kernel_h, kernel_w, "rotation bank needs a square kernel");

        let kernels = core::array::from_fn(|rotation| {
            if rotation == 0 {
                kernel.clone()
            } else {
                permute_planes(kernel.clone(), &rotation_indices(kernel_h, rotation))
            }
        });

        Self { kernels }
    }

    pub fn get(&self, rotation: usize) -> &Tensor<B, 4> {
        &self.kernels[rotation]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor<B, 4>> {
        self.kernels.iter()
    }

    /// Folds per-rotation kernel gradients back onto the single learned
    /// kernel: each gradient is un-rotated and the four are summed.
    pub fn fold_gradients(grads: [Tensor<B, 4>; NUM_ROTATIONS]) -> Tensor<B, 4> {
        let [_, _, kernel_size, _] = grads[0].dims();
        let unrotate = |grad: Tensor<B, 4>, rotation: usize| {
            permute_planes(grad, &inverse_rotation_indices(kernel_size, rotation))
        };

        let [grad_0, grad_90, grad_180, grad_270] = grads;
        grad_0 + unrotate(grad_90, 1) + unrotate(grad_180, 2) + unrotate(grad_270, 3)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turn_is_counter_clockwise() {
        // 0 1 2        2 5 8
        // 3 4 5  --->  1 4 7
        // 6 7 8        0 3 6
        assert_eq!(rotation_indices(3, 1), vec![2, 5, 8, 1, 4, 7, 0, 3, 6]);
        assert_eq!(rotation_indices(3, 2), vec![8, 7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(rotation_indices(3, 3), vec![6, 3, 0, 7, 4, 1, 8, 5, 2]);
    }

    #[test]
    fn rotations_are_permutations() {
        for k in 1..=6 {
            for rotation in 0..NUM_ROTATIONS {
                let mut indices = rotation_indices(k, rotation);
                indices.sort_unstable();
                assert_eq!(indices, (0..k * k).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn inverse_undoes_rotation() {
        for k in [2, 3, 5] {
            for rotation in 0..NUM_ROTATIONS {
                let forward = rotation_indices(k, rotation);
                let inverse = inverse_rotation_indices(k, rotation);
                for p in 0..k * k {
                    assert_eq!(forward[inverse[p]], p);
                }
            }
        }
    }

    #[test]
    fn four_quarter_turns_compose_to_identity() {
        let k = 4;
        let step = rotation_indices(k, 1);
        let mut cells: Vec<usize> = (0..k * k).collect();
        for _ in 0..NUM_ROTATIONS {
            cells = step.iter().map(|&src| cells[src]).collect();
        }
        assert_eq!(cells, (0..k * k).collect::<Vec<_>>());
    }

    #[cfg(feature = "backend_ndarray")]
    mod bank {
        use super::*;
        use approx::assert_abs_diff_eq;
        use burn::tensor::{Distribution, TensorData};

        type NdArrayBackend = burn::backend::NdArray<f32>;

        fn values(tensor: Tensor<NdArrayBackend, 4>) -> Vec<f32> {
            tensor.into_data().to_vec::<f32>().unwrap()
        }

        #[test]
        fn first_entry_is_the_kernel() {
            let device = Default::default();
            let kernel = Tensor::<NdArrayBackend, 4>::random([3, 2, 3, 3], Distribution::Default, &device);
            let bank = RotatedKernelBank::build(kernel.clone());

            assert_eq!(values(bank.get(0).clone()), values(kernel));
        }

        #[test]
        fn entries_share_the_kernel_multiset() {
            let device = Default::default();
            let kernel = Tensor::<NdArrayBackend, 4>::random([2, 3, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
            let bank = RotatedKernelBank::build(kernel.clone());

            let mut expected = values(kernel);
            expected.sort_by(f32::total_cmp);
            for entry in bank.iter() {
                let mut actual = values(entry.clone());
                actual.sort_by(f32::total_cmp);
                assert_eq!(actual, expected);
            }
        }

        #[test]
        fn rotation_is_applied_per_plane() {
            let device = Default::default();
            let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
            let kernel = Tensor::<NdArrayBackend, 4>::from_data(TensorData::new(data, [2, 1, 2, 2]), &device);
            let bank = RotatedKernelBank::build(kernel);

            assert_eq!(values(bank.get(1).clone()), vec![1.0, 3.0, 0.0, 2.0, 5.0, 7.0, 4.0, 6.0]);
            assert_eq!(values(bank.get(2).clone()), vec![3.0, 2.0, 1.0, 0.0, 7.0, 6.0, 5.0, 4.0]);
        }

        #[test]
        fn fold_of_rotated_copies_restores_each_view() {
            let device = Default::default();
            let kernel = Tensor::<NdArrayBackend, 4>::random([1, 1, 3, 3], Distribution::Uniform(-1.0, 1.0), &device);
            let bank = RotatedKernelBank::build(kernel.clone());

            let grads = core::array::from_fn(|r| bank.get(r).clone());
            let folded = values(RotatedKernelBank::fold_gradients(grads));

            for (actual, expected) in folded.iter().zip(values(kernel.mul_scalar(4.0))) {
                assert_abs_diff_eq!(*actual, expected, epsilon = 1e-6);
            }
        }
    }
}
