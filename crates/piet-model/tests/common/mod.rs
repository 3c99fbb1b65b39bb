#![allow(dead_code)]

use piet_model::{Dataset, EditListener, EditNotice};
use std::cell::RefCell;
use std::rc::Rc;

pub const METADATA_ID: &str = "http://localhost:59090/getMetadata?connectionName=foodmart";

pub const STORE_SQFT: &str = "[Measures].[Store Sqft]";
pub const GROCERY_SQFT: &str = "[Measures].[Grocery Sqft]";
pub const STORE_COUNTRY: &str = "[Store].[Stores].[Store Country]";
pub const STORE_STATE: &str = "[Store].[Stores].[Store State]";
pub const STORE_CITY: &str = "[Store].[Stores].[Store City]";
pub const STORE_NAME: &str = "[Store].[Stores].[Store Name]";
pub const STORE_TYPE: &str = "[Store Type].[Store Type].[Store Type]";
pub const HAS_COFFEE_BAR: &str = "[Has coffee bar].[Has coffee bar].[Has coffee bar]";

/// Two cubes from the FoodMart sample schema, in mondrian-rest `getMetadata` form.
pub const FOODMART_METADATA: &str = r#"{
  "name": "FoodMart",
  "cubes": [
    {
      "name": "Store",
      "caption": "Store",
      "measures": [
        { "name": "Store Sqft", "caption": "Store Sqft", "visible": true, "calculated": false },
        { "name": "Grocery Sqft", "caption": "Grocery Sqft", "visible": true, "calculated": false }
      ],
      "dimensions": [
        {
          "name": "Measures",
          "caption": "Measures",
          "type": "MEASURE",
          "hierarchies": []
        },
        {
          "name": "Store",
          "caption": "Store",
          "type": "STANDARD",
          "hierarchies": [
            {
              "name": "Stores",
              "caption": "Stores",
              "hasAll": true,
              "levels": [
                { "name": "Store Country", "caption": "Store Country" },
                { "name": "Store State", "caption": "Store State" },
                { "name": "Store City", "caption": "Store City" },
                { "name": "Store Name", "caption": "Store Name" }
              ]
            }
          ]
        },
        {
          "name": "Store Type",
          "type": "STANDARD",
          "hierarchies": [
            {
              "name": "Store Type",
              "hasAll": true,
              "levels": [ { "name": "Store Type" } ]
            }
          ]
        },
        {
          "name": "Has coffee bar",
          "type": "STANDARD",
          "hierarchies": [
            {
              "name": "Has coffee bar",
              "hasAll": true,
              "levels": [ { "name": "Has coffee bar" } ]
            }
          ]
        }
      ]
    },
    {
      "name": "Warehouse",
      "caption": "Warehouse",
      "measures": [
        { "name": "Units Ordered" },
        { "name": "Units Shipped" }
      ],
      "dimensions": [
        {
          "name": "Product",
          "type": "STANDARD",
          "hierarchies": [
            {
              "name": "Products",
              "hasAll": true,
              "levels": [
                { "name": "Product Family" },
                { "name": "Product Department" }
              ]
            }
          ]
        },
        {
          "name": "Warehouse",
          "type": "STANDARD",
          "hierarchies": [
            {
              "name": "Warehouses",
              "hasAll": true,
              "levels": [
                { "name": "Country" },
                { "name": "State Province" }
              ]
            }
          ]
        },
        {
          "name": "Time",
          "type": "TIME",
          "hierarchies": [
            {
              "name": "Time",
              "hasAll": false,
              "levels": [ { "name": "Year" }, { "name": "Quarter" } ]
            }
          ]
        }
      ]
    }
  ]
}"#;

pub fn foodmart() -> Vec<Dataset> {
    Dataset::load_from_metadata(FOODMART_METADATA, METADATA_ID).unwrap()
}

pub fn store_dataset() -> Rc<Dataset> {
    Rc::new(foodmart().remove(0))
}

pub fn warehouse_dataset() -> Rc<Dataset> {
    Rc::new(foodmart().remove(1))
}

pub fn catalog() -> Vec<Rc<Dataset>> {
    foodmart().into_iter().map(Rc::new).collect()
}

/// An edit listener that records every notice it receives.
pub fn recording_listener() -> (Rc<RefCell<Vec<EditNotice>>>, Box<EditListener>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let listener: Box<EditListener> = Box::new(move |notice: &EditNotice| {
        sink.borrow_mut().push(*notice);
        Ok(())
    });
    (seen, listener)
}
