//! crates/hvac_consult_core/src/catalog.rs
//!
//! Seed data: the default quiz and the default photo category registry.
//! Discount weights live in the category store once seeded and can be
//! changed there without touching this file.

use crate::domain::{ImageCategory, InputType, Question, SubCategory};
use uuid::Uuid;

fn question(order: i32, text: &str, input_type: InputType, options: &[&str]) -> Question {
    Question {
        id: Uuid::new_v4(),
        question_text: text.to_string(),
        input_type,
        options: if options.is_empty() {
            None
        } else {
            Some(options.iter().map(|o| o.to_string()).collect())
        },
        is_required: true,
        order,
    }
}

/// The eleven-question intake quiz, grouped in four stages.
pub fn default_questions() -> Vec<Question> {
    let mut health = question(
        9,
        "Anyone have any underlying health conditions like seasonal allergies etc?",
        InputType::Text,
        &[],
    );
    health.is_required = false;

    vec![
        // Stage 1: the basics
        question(1, "What is your full name?", InputType::Text, &[]),
        question(
            2,
            "What is the address of the property for this project?",
            InputType::Text,
            &[],
        ),
        question(3, "What's the best email to send your report to?", InputType::Email, &[]),
        question(
            4,
            "And what is a good mobile number in case we get disconnected during a future call?",
            InputType::Tel,
            &[],
        ),
        // Stage 2: the home's profile
        question(
            5,
            "About how old is your main HVAC system?",
            InputType::Radio,
            &["0-5 Years", "6-10 Years", "11-15 Years", "15+ Years"],
        ),
        question(
            6,
            "What's the approximate square footage of the area this system heats and cools?",
            InputType::Radio,
            &[
                "Under 1,500 sq ft",
                "1,500 - 2,200 sq ft",
                "2,200 - 3,000 sq ft",
                "Over 3,000 sq ft",
            ],
        ),
        question(
            7,
            "How many separate systems control your home's temperature?",
            InputType::Radio,
            &["1", "2", "3", "4"],
        ),
        question(
            8,
            "What kind of system do you currently have?",
            InputType::Radio,
            &[
                "Furnace/Air Conditioner",
                "Heat Pump/Air handler",
                "Mini Split",
                "Package unit",
            ],
        ),
        health,
        // Stage 3: comfort challenges
        question(
            10,
            "What's the #1 frustration you're hoping to solve with a new system? (Check all that apply)",
            InputType::Checkbox,
            &[
                "High Energy Bills",
                "Uneven Temperatures (Hot & cold spots)",
                "Poor Air Quality (Allergies, dust, stuffiness)",
                "System is Too Loud",
                "It's Unreliable / Broken Down",
                "It's Just Old & I'm Planning Ahead",
            ],
        ),
        // Stage 4: project goals
        question(
            11,
            "When it comes to a new system, which of these sounds most like you?",
            InputType::Radio,
            &["Budget-Focused", "Efficiency & Value", "Ultimate Comfort"],
        ),
    ]
}

fn sub(key: &str, display_name: &str, description: &str, tip: &str) -> SubCategory {
    SubCategory {
        key: key.to_string(),
        display_name: display_name.to_string(),
        description: Some(description.to_string()),
        tip: Some(tip.to_string()),
    }
}

fn category(
    key: &str,
    display_name: &str,
    discount_amount: i64,
    description: &str,
    why: &str,
    sub_categories: Vec<SubCategory>,
) -> ImageCategory {
    ImageCategory {
        category: key.to_string(),
        display_name: display_name.to_string(),
        discount_amount,
        description: Some(description.to_string()),
        why_we_need_this: Some(why.to_string()),
        sub_categories,
    }
}

/// The five photo categories and their default discount weights.
pub fn default_categories() -> Vec<ImageCategory> {
    vec![
        category(
            "outdoor_unit",
            "The Outdoor Unit (AC or Heat Pump)",
            150,
            "These photos tell us the age, size, efficiency, and condition of your system.",
            "This is crucial for us to understand your system's efficiency and overall condition.",
            vec![
                sub(
                    "big_picture",
                    "Big Picture",
                    "Photo from 10-15 ft showing the whole outdoor unit.",
                    "Make sure to capture surroundings too.",
                ),
                sub(
                    "data_plate",
                    "Data Plate",
                    "Close photo of model/serial sticker.",
                    "Wipe it clean if dirty.",
                ),
            ],
        ),
        category(
            "power_hub",
            "The Power Hub (Breaker Panel)",
            50,
            "Understand your home's electrical capacity for safe installation.",
            "Ensures your home can safely handle modern upgrades.",
            vec![
                sub(
                    "panel_cover",
                    "Panel Cover",
                    "Closed breaker panel with brand visible.",
                    "Stand back 3-4 feet.",
                ),
                sub(
                    "inside_panel",
                    "Inside Panel",
                    "Open panel showing breakers.",
                    "Use flash for clarity.",
                ),
            ],
        ),
        category(
            "command_center",
            "Command Center (Thermostat)",
            25,
            "Helps us recommend the best smart thermostat upgrades.",
            "Shows how you control your system.",
            vec![sub(
                "main_thermostat",
                "Main Thermostat",
                "Photo of your main thermostat.",
                "Capture the display clearly.",
            )],
        ),
        category(
            "indoor_system",
            "Indoor System",
            500,
            "Helps us understand your air handler/furnace.",
            "Tells us about indoor air movement and heating/cooling compatibility.",
            vec![sub(
                "indoor_unit",
                "Indoor Unit",
                "Photo of air handler/furnace.",
                "Include labels if visible.",
            )],
        ),
        category(
            "energy_bill",
            "Energy Bill",
            200,
            "Shows your current usage to estimate savings.",
            "Helps us project efficiency improvements.",
            vec![sub(
                "recent_bill",
                "Recent Bill",
                "Photo of your latest energy bill.",
                "Ensure account # and kWh usage are visible.",
            )],
        ),
    ]
}
