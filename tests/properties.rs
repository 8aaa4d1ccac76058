//! Structural properties of enlargement, superblock assembly and truncation
//! over randomly drawn XXZ couplings.

use nalgebra as na;
use rand::{ rngs::StdRng, Rng, SeedableRng };
use block_dmrg::{
    block::Block,
    comm::SelfComm,
    config::SolverConfig,
    eigen,
    kron::{ self, KronBlocks },
    model::{ Heisenberg, LatticeModel },
    qn::{ qn_eq, QuantumNumbers },
    sparse,
    truncation::{ self, TruncError },
};
use nalgebra_sparse::CsrMatrix;

const SAMPLES: usize = 8;

fn random_model(rng: &mut StdRng, nsites: usize) -> Heisenberg {
    Heisenberg::xxz(nsites, rng.gen_range(0.2..1.5), rng.gen_range(-1.0..2.0))
}

fn enlarge_to(model: &Heisenberg, n: usize) -> Block {
    let site = Block::single_site();
    let mut block = Block::single_site();
    while block.num_sites() < n {
        let terms = model.terms(block.num_sites() + 1);
        block = kron::kron_eye(&block, &site, &terms).unwrap();
    }
    block
}

fn shifts_sectors(mat: &CsrMatrix<f64>, qn: &QuantumNumbers, shift: f64) -> bool {
    mat.triplet_iter()
        .all(|(i, j, _)| {
            let qi = qn.list()[qn.sector_of_state(i).unwrap()];
            let qj = qn.list()[qn.sector_of_state(j).unwrap()];
            qn_eq(qi, qj + shift)
        })
}

#[test]
fn enlargement_structure() {
    let mut rng = StdRng::seed_from_u64(10546);
    for _ in 0..SAMPLES {
        let model = random_model(&mut rng, 8);
        let site = Block::single_site();
        let mut block = Block::single_site();
        for n in 2..=6 {
            let enl = kron::kron_eye(&block, &site, &model.terms(n)).unwrap();
            assert_eq!(enl.dim(), 2 * block.dim());
            assert!(shifts_sectors(enl.h(), enl.qn(), 0.0));
            assert!(shifts_sectors(enl.sz(), enl.qn(), 0.0));
            assert!(shifts_sectors(enl.sp(), enl.qn(), 1.0));
            // sector values strictly decrease
            assert!(enl.qn().list().windows(2).all(|w| w[0] > w[1]));
            block = enl;
        }
    }
}

#[test]
fn superblock_symmetry() {
    let mut rng = StdRng::seed_from_u64(2718);
    for _ in 0..SAMPLES {
        let model = random_model(&mut rng, 10);
        let nl = rng.gen_range(1..=5);
        let nr = rng.gen_range(1..=5);
        let sys = enlarge_to(&model, nl);
        let env = enlarge_to(&model, nr);
        let target = if (nl + nr) % 2 == 0 { 0.0 } else { 0.5 };
        let (kb, h)
            = kron::superblock(&sys, &env, &model.terms(nl + nr), &[target]).unwrap();
        assert_eq!(h.nrows(), kb.num_states());
        assert!(sparse::max_asymmetry(&h) <= 1e-12);
    }
}

// superblock ground state of a random chain split into enlarged halves
fn random_state(rng: &mut StdRng) -> (KronBlocks, na::DVector<f64>) {
    let model = random_model(rng, 8);
    let n = 2 * rng.gen_range(2..=4);
    let sys = enlarge_to(&model, n / 2);
    let (kb, h) = kron::superblock(&sys, &sys, &model.terms(n), &[0.0]).unwrap();
    let gs = eigen::ground_state(&h, &SolverConfig::default()).unwrap();
    (kb, gs.vector)
}

#[test]
fn truncation_error_non_increasing() {
    let mut rng = StdRng::seed_from_u64(31415);
    for _ in 0..SAMPLES {
        let (kb, v) = random_state(&mut rng);
        let dim = kb.left_qn().num_states();
        let errs: Vec<f64>
            = (1..=dim)
            .map(|m| {
                truncation::get_truncation(&SelfComm, &kb, &v, m)
                    .unwrap().left.trunc_err
            })
            .collect();
        assert!(errs.windows(2).all(|w| w[1] <= w[0] + 1e-12));
        assert!(errs.iter().all(|e| *e >= -1e-12));
        assert!(errs[dim - 1].abs() < 1e-12);
    }
}

#[test]
fn rotation_is_isometry_and_projector_idempotent() {
    let mut rng = StdRng::seed_from_u64(16180);
    for _ in 0..SAMPLES {
        let (kb, v) = random_state(&mut rng);
        let dim = kb.left_qn().num_states();
        let m = rng.gen_range(1..=dim);
        let pair = truncation::get_truncation(&SelfComm, &kb, &v, m).unwrap();
        for trunc in [&pair.left, &pair.right] {
            let r = &trunc.rot_t;
            let k = r.nrows();
            assert!(k <= m);
            assert_eq!(trunc.qn.num_states(), k);
            let rrt = r * r.transpose();
            assert!((rrt - na::DMatrix::<f64>::identity(k, k)).abs().max() < 1e-12);
            let p = r.transpose() * r;
            assert!((&p * &p - &p).abs().max() < 1e-12);
        }
    }
}

#[test]
fn rotated_block_keeps_sector_structure() {
    let mut rng = StdRng::seed_from_u64(1414);
    for _ in 0..SAMPLES {
        let model = random_model(&mut rng, 8);
        let sys = enlarge_to(&model, 3);
        let (kb, h) = kron::superblock(&sys, &sys, &model.terms(6), &[0.0]).unwrap();
        let gs = eigen::ground_state(&h, &SolverConfig::default()).unwrap();
        let m = rng.gen_range(1..=8);
        let pair = truncation::get_truncation(&SelfComm, &kb, &gs.vector, m).unwrap();
        let mut new = sys.clone();
        new.rotate(&pair.left.rot_t, pair.left.qn.clone()).unwrap();
        assert!(shifts_sectors(new.h(), new.qn(), 0.0));
        assert!(shifts_sectors(new.sz(), new.qn(), 0.0));
        assert!(shifts_sectors(new.sp(), new.qn(), 1.0));
        assert!(sparse::max_asymmetry(new.h()) < 1e-12);
    }
}

#[test]
fn unrestricted_truncation_unsupported() {
    let site = Block::single_site();
    let enl = kron::kron_eye(&site, &site, &Heisenberg::new(2).terms(2)).unwrap();
    let kb = KronBlocks::unrestricted(enl.qn(), enl.qn());
    let v = na::DVector::from_element(kb.num_states(), 0.25);
    assert!(matches!(
        truncation::get_truncation(&SelfComm, &kb, &v, 4),
        Err(TruncError::Unsupported(_)),
    ));
}
