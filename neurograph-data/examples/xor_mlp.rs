//! # Exemple d'Entraînement : Perceptron Multicouche sur XOR
//!
//! Cet exemple construit un petit réseau à une couche cachée et l'entraîne à
//! reproduire la fonction XOR bruitée.
//!
//! ## Fonctionnalités Démontrées:
//! 1.  Construction du graphe avec `nn::input`, `nn::linear` et `nn::cost_layer`.
//! 2.  Entraînement avec `train_fnn1` et un `TrainConfig` (validation, arrêt anticipé).
//! 3.  Inférence exemple par exemple avec `apply1`.
//!
//! ## Exécution
//! `RUST_LOG=info cargo run --example xor_mlp`

use neurograph_core::nn::{cost_layer, input, linear, CostType};
use neurograph_core::{Graph, GraphBuilder, Model, NeuroGraphError};
use neurograph_data::{train_fnn1, TrainConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<(), NeuroGraphError> {
    env_logger::init();

    let mut b = GraphBuilder::with_seed(1);
    let x = input(&mut b, 2)?;
    let hidden = linear(&mut b, x, 16)?;
    let hidden = b.tanh(hidden)?;
    let cost = cost_layer(&mut b, hidden, 1, CostType::CeBin)?;
    let mut model = Graph::new(b, cost, &[])?;

    // Points bruités autour des quatre coins du carré unité.
    let mut rng = StdRng::seed_from_u64(2);
    let (mut inputs, mut targets) = (Vec::new(), Vec::new());
    for _ in 0..1000 {
        let a: bool = rng.gen();
        let c: bool = rng.gen();
        inputs.push(a as u8 as f32 + rng.gen_range(-0.1f32..0.1));
        inputs.push(c as u8 as f32 + rng.gen_range(-0.1f32..0.1));
        targets.push((a ^ c) as u8 as f32);
    }

    let config = TrainConfig {
        learning_rate: 0.01,
        mini_batch: 32,
        max_epochs: 50,
        seed: Some(3),
        ..Default::default()
    };
    let epochs = train_fnn1(&mut model, &config, &inputs, &targets)?;
    println!("trained for {} epochs", epochs);

    for (a, c) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
        let y = model.apply1(&[a, c])?[0];
        println!("{} xor {} -> {:.3}", a, c, y);
    }
    Ok(())
}
