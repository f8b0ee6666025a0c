/*
[INPUT]:  Item attribute, task policy, configured error rate, task RNG
[OUTPUT]: True and assigned classification plus the error flag
[POS]:    Routing layer - decides the destination bin at the decision point
[UPDATE]: When the perturbation rule for erroneous assignments changes
*/

use rand::Rng;

use crate::error_model;
use crate::item::{Attribute, BinId};
use crate::policy::TaskPolicy;

/// Outcome of routing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub true_class: BinId,
    pub assigned_class: BinId,
    pub error_occurred: bool,
}

/// Compute the true class from the attribute, then apply the error model.
///
/// On an error the assigned class is the true class perturbed: binary domains
/// flip, N-ary domains pick uniformly among the other N-1 bins.
pub fn classify<R: Rng>(
    rng: &mut R,
    policy: &TaskPolicy,
    attribute: &Attribute,
    error_rate: f64,
) -> Classification {
    let true_class = policy.true_class(attribute);
    let bin_count = policy.bin_count();
    let error_occurred = bin_count > 1 && error_model::causes_error(rng, error_rate);

    let assigned_class = if error_occurred {
        perturb(rng, true_class, bin_count)
    } else {
        true_class
    };

    Classification {
        true_class,
        assigned_class,
        error_occurred,
    }
}

fn perturb<R: Rng>(rng: &mut R, true_class: BinId, bin_count: usize) -> BinId {
    let offset = rng.gen_range(1..bin_count);
    (true_class + offset) % bin_count
}
