//! Seeded synthetic store data
//!
//! Generates a 26-section store, a product catalog and customer paths with a
//! built-in community structure, so the pipeline has something realistic to
//! find without real traffic logs.

use crate::model::{MovementEvent, Product, ProductId, Section, SectionId};
use rand::distributions::{WeightedError, WeightedIndex};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// 2024-01-01T09:00:00Z
const BASE_TIME_MS: i64 = 1_704_099_600_000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const GRID_WIDTH: usize = 6;
const MAX_PATH_LENGTH: usize = 15;

const SECTION_NAMES: [&str; 26] = [
    "Entrance",
    "Produce",
    "Bakery",
    "Dairy",
    "Frozen",
    "Meat",
    "Deli",
    "Beverages",
    "Snacks",
    "Canned Goods",
    "Condiments",
    "Household",
    "Checkout",
    "Health & Beauty",
    "Pet Supplies",
    "Baby Products",
    "Cleaning",
    "Paper Products",
    "Pharmacy",
    "Electronics",
    "Books",
    "Toys",
    "Seasonal",
    "Garden",
    "Customer Service",
    "Returns",
];

const ENTRANCE: usize = 0;
const CHECKOUT: usize = 12;

/// Sections customers tend to visit together
const COMMUNITIES: [&[usize]; 4] = [
    &[1, 2, 3, 4, 5, 6],                // fresh: B-G
    &[7, 8, 9, 10],                     // pantry: H-K
    &[11, 14, 16, 17],                  // household: L, O, Q, R
    &[13, 15, 18, 19, 20, 21, 22, 23], // specialty: N, P, S-X
];

/// (category, home section, name templates)
const CATEGORIES: [(&str, usize, [&str; 3]); 20] = [
    ("Produce", 1, ["Organic {}", "Fresh {}", "{} Bundle"]),
    ("Bakery", 2, ["{} Bread", "{} Pastry", "{} Cake"]),
    ("Dairy", 3, ["{} Milk", "{} Cheese", "{} Yogurt"]),
    ("Frozen", 4, ["Frozen {}", "{} Ice Cream", "{} Pizza"]),
    ("Meat", 5, ["{} Chicken", "{} Beef", "{} Pork"]),
    ("Deli", 6, ["Sliced {}", "{} Ham", "{} Turkey"]),
    ("Beverages", 7, ["{} Juice", "{} Soda", "{} Water"]),
    ("Snacks", 8, ["{} Chips", "{} Crackers", "{} Nuts"]),
    ("Canned Goods", 9, ["Canned {}", "{} Soup", "{} Beans"]),
    ("Condiments", 10, ["{} Sauce", "{} Dressing", "{} Ketchup"]),
    ("Household", 11, ["{} Detergent", "{} Cleaner", "{} Soap"]),
    ("Health & Beauty", 13, ["{} Shampoo", "{} Lotion", "{} Toothpaste"]),
    ("Pet Supplies", 14, ["{} Dog Food", "{} Cat Food", "{} Pet Treats"]),
    ("Baby Products", 15, ["{} Diapers", "{} Baby Food", "{} Wipes"]),
    ("Cleaning", 16, ["{} Mop", "{} Broom", "{} Vacuum Bags"]),
    ("Paper Products", 17, ["{} Towels", "{} Napkins", "{} Tissue"]),
    ("Pharmacy", 18, ["{} Medicine", "{} Vitamins", "{} First Aid"]),
    ("Electronics", 19, ["{} Batteries", "{} Charger", "{} Headphones"]),
    ("Books", 20, ["{} Magazine", "{} Novel", "{} Cookbook"]),
    ("Toys", 21, ["{} Puzzle", "{} Game", "{} Action Figure"]),
];

const ADJECTIVES: [&str; 10] = [
    "Premium",
    "Value",
    "Family Size",
    "Single Serve",
    "Large",
    "Small",
    "Economy",
    "Deluxe",
    "Classic",
    "Special",
];

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("invalid section weights: {0}")]
    Weights(#[from] WeightedError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub sessions: usize,
    pub products: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sessions: 10_000,
            products: 100,
            seed: 42,
        }
    }
}

/// A complete synthetic data set
#[derive(Debug, Clone)]
pub struct Simulation {
    pub sections: Vec<Section>,
    pub products: Vec<Product>,
    /// Ordered by (session, step)
    pub movements: Vec<MovementEvent>,
}

pub fn simulate(config: &SimulationConfig) -> Result<Simulation, SimulationError> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let sections = store_sections();
    let movements = generate_paths(config.sessions, &sections, &mut rng)?;
    let products = generate_products(config.products, &sections, &mut rng);

    info!(
        "Simulated {} sections, {} products and {} movement events from {} sessions",
        sections.len(),
        products.len(),
        movements.len(),
        config.sessions
    );

    Ok(Simulation {
        sections,
        products,
        movements,
    })
}

/// Sections A-Z laid out row by row on a six-wide grid
pub fn store_sections() -> Vec<Section> {
    SECTION_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let id = char::from(b'A' + i as u8).to_string();
            Section::new(id, *name, (i % GRID_WIDTH) as i32, (i / GRID_WIDTH) as i32)
        })
        .collect()
}

/// Gamma(3, 2) as the sum of three exponentials with mean 2
fn gamma_3_2(rng: &mut StdRng) -> f64 {
    (0..3)
        .map(|_| -2.0 * (1.0 - rng.gen::<f64>()).ln())
        .sum()
}

fn generate_paths(
    sessions: usize,
    sections: &[Section],
    rng: &mut StdRng,
) -> Result<Vec<MovementEvent>, SimulationError> {
    // Entrance and checkout draw the most traffic, then the fresh aisles
    let weights: Vec<u32> = (0..sections.len())
        .map(|i| match i {
            ENTRANCE | CHECKOUT => 3,
            1..=4 => 2,
            _ => 1,
        })
        .collect();
    let explore = WeightedIndex::new(&weights)?;
    let entrance_area = sections.len().min(10);

    let mut events = Vec::new();
    for session in 0..sessions {
        let session_id = format!("sess_{:06}", session);
        let length = (gamma_3_2(rng) as usize + 3).min(MAX_PATH_LENGTH);

        let mut path = Vec::with_capacity(length + 1);
        if rng.gen_bool(0.8) {
            path.push(ENTRANCE);
        } else {
            path.push(rng.gen_range(0..entrance_area));
        }

        let community = COMMUNITIES[rng.gen_range(0..COMMUNITIES.len())];
        for _ in 1..length {
            let last = path[path.len() - 1];
            let next = if rng.gen_bool(0.7) {
                let candidates: Vec<usize> = community.iter().copied().filter(|&s| s != last).collect();
                match candidates.choose(rng) {
                    Some(&s) => s,
                    None => rng.gen_range(0..sections.len()),
                }
            } else {
                explore.sample(rng)
            };
            path.push(next);
        }

        if rng.gen_bool(0.7) && path[path.len() - 1] != CHECKOUT {
            path.push(CHECKOUT);
        }

        let mut timestamp = BASE_TIME_MS
            + rng.gen_range(0..30) * DAY_MS
            + rng.gen_range(0..12 * 60) * 60_000;
        for (step, &section) in path.iter().enumerate() {
            if step > 0 {
                timestamp += rng.gen_range(30..300) * 1000;
            }
            events.push(MovementEvent::new(
                session_id.clone(),
                step as u32,
                sections[section].id.clone(),
                timestamp,
            ));
        }
    }
    Ok(events)
}

fn product_name(templates: &[&str; 3], rng: &mut StdRng) -> String {
    let template = templates[rng.gen_range(0..templates.len())];
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    template.replace("{}", adjective)
}

fn generate_products(count: usize, sections: &[Section], rng: &mut StdRng) -> Vec<Product> {
    // Misplaced products land anywhere between the entrance and the checkout
    let aisle = |rng: &mut StdRng| -> SectionId { sections[rng.gen_range(1..CHECKOUT)].id.clone() };

    let mut products = Vec::with_capacity(count);
    let per_category = count / CATEGORIES.len();

    for (category, home, templates) in CATEGORIES.iter() {
        for _ in 0..per_category {
            let name = product_name(templates, rng);
            let section = if rng.gen_bool(0.8) {
                sections[*home].id.clone()
            } else {
                aisle(rng)
            };
            let id = ProductId(products.len() as u64 + 1);
            products.push(Product::new(id, name, *category, Some(section)));
        }
    }

    while products.len() < count {
        let (category, _, templates) = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
        let name = product_name(&templates, rng);
        let section = aisle(rng);
        let id = ProductId(products.len() as u64 + 1);
        products.push(Product::new(id, name, category, Some(section)));
    }

    products
}
