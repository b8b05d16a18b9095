//! # Exemple de Réseau Récurrent : Déroulage et Alimentation Continue
//!
//! Cet exemple entraîne une cellule GRU à prédire le pas suivant d'une suite
//! périodique, puis l'utilise en mode continu.
//!
//! ## Fonctionnalités Démontrées:
//! 1.  Construction d'un graphe récurrent avec `nn::gru` et `nn::cost_layer`.
//! 2.  Déroulage sur une fenêtre fixe (`Graph::unroll`) et liaison d'un tampon par pas.
//! 3.  Entraînement du graphe déroulé avec `RmsProp` (les paramètres sont partagés).
//! 4.  Inférence pas à pas avec `rnn_start` / `apply1` / `rnn_end`.
//!
//! ## Exécution
//! `cargo run --example rnn_streaming`

use log::info;
use neurograph_core::nn::{cost_layer, gru, input, CostType};
use neurograph_core::optim::{Optimizer, RmsProp, RmsPropHyperParams};
use neurograph_core::{feed_buffer, FeedBuffer, Flags, Graph, GraphBuilder, Model, NeuroGraphError};

const WINDOW: usize = 8;
const PERIOD: usize = 12;

fn signal(t: usize) -> f32 {
    (2.0 * std::f32::consts::PI * (t % PERIOD) as f32 / PERIOD as f32).sin()
}

fn main() -> Result<(), NeuroGraphError> {
    env_logger::init();

    let mut b = GraphBuilder::with_seed(7);
    let x = input(&mut b, 1)?;
    let h = gru(&mut b, x, 16)?;
    let cost = cost_layer(&mut b, h, 1, CostType::Mse)?;
    let mut graph = Graph::new(b, cost, &[])?;
    info!("model has {} parameters", graph.size_var());

    let mut opt = RmsProp::new(RmsPropHyperParams {
        lr: 0.01,
        clip: Some(1.0),
        ..Default::default()
    })?;

    {
        let mut unrolled = graph.unroll(WINDOW)?;
        let inputs: Vec<FeedBuffer> = (0..WINDOW).map(|_| feed_buffer(vec![0.0])).collect();
        let truths: Vec<FeedBuffer> = (0..WINDOW).map(|_| feed_buffer(vec![0.0])).collect();
        unrolled.feed_bind(Flags::INPUT, 0, inputs.clone())?;
        unrolled.feed_bind(Flags::TRUTH, 0, truths.clone())?;

        for epoch in 0..200 {
            let mut total = 0.0;
            for start in 0..PERIOD {
                for t in 0..WINDOW {
                    write(&inputs[t], signal(start + t))?;
                    write(&truths[t], signal(start + t + 1))?;
                }
                total += unrolled.cost(0, true)?;
                opt.step(&mut unrolled)?;
            }
            if epoch % 50 == 0 {
                info!("epoch {}: mean window cost {:.5}", epoch, total / PERIOD as f32);
            }
        }
    }

    graph.rnn_start();
    for t in 0..2 * PERIOD {
        let y = graph.apply1(&[signal(t)])?[0];
        println!("t={:2} input={:+.3} predicted next={:+.3} actual={:+.3}", t, signal(t), y, signal(t + 1));
    }
    graph.rnn_end();
    Ok(())
}

fn write(buffer: &FeedBuffer, value: f32) -> Result<(), NeuroGraphError> {
    let mut guard = buffer.write().map_err(|e| NeuroGraphError::LockError {
        lock_type: "write".to_string(),
        reason: e.to_string(),
    })?;
    guard[0] = value;
    Ok(())
}
