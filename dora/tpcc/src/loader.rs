//! Deterministic population of a [`TpccDb`].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use smol_str::SmolStr;
use tracing::info;

use crate::config::ScaleConfig;
use crate::error::TpccResult;
use crate::schema::{
    Customer, District, History, Item, NameEntry, NewOrder, Order, OrderLine, Stock, TpccDb,
    Warehouse,
};

const SYLLABLES: [&str; 10] = [
    "BAR", "OUGHT", "ABLE", "PRI", "PRES", "ESE", "ANTI", "CALLY", "ATION", "EING",
];

/// Fixed timestamp of loaded rows.
pub const LOAD_DATE: u64 = 1_000_000_000;

pub const INITIAL_W_YTD_PER_DISTRICT: f64 = 30_000.0;

/// The TPC-C last name for `num` in `0..1000`.
pub fn last_name(num: i32) -> SmolStr {
    let num = num.rem_euclid(1000) as usize;
    let mut name = String::with_capacity(15);
    name.push_str(SYLLABLES[num / 100]);
    name.push_str(SYLLABLES[(num / 10) % 10]);
    name.push_str(SYLLABLES[num % 10]);
    SmolStr::from(name)
}

/// The last name of customer `c_id` of every district.
pub fn last_name_of(scale: &ScaleConfig, c_id: i32) -> SmolStr {
    last_name((c_id - 1) % scale.last_names)
}

fn astring(rng: &mut StdRng, min: usize, max: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let len = rng.random_range(min..=max);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

fn nstring(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Item and stock data; one in ten contains `ORIGINAL`.
fn data_field(rng: &mut StdRng) -> String {
    let mut data = astring(rng, 26, 50);
    if rng.random_ratio(1, 10) {
        let at = rng.random_range(0..=data.len() - 8);
        data.replace_range(at..at + 8, "ORIGINAL");
    }
    data
}

fn money(rng: &mut StdRng, lo: i64, hi: i64) -> f64 {
    rng.random_range(lo..=hi) as f64 / 100.0
}

/// Creates and fills a database of the given scale.
pub fn load(scale: &ScaleConfig) -> TpccResult<TpccDb> {
    scale.validate()?;
    let db = TpccDb::empty(scale.clone());
    let mut rng = StdRng::seed_from_u64(scale.seed);
    load_items(&db, &mut rng);
    for w_id in 1..=scale.warehouses {
        load_warehouse(&db, &mut rng, w_id);
    }
    info!(
        warehouses = scale.warehouses,
        customers = db.customer.len(),
        orders = db.order.len(),
        "database loaded"
    );
    Ok(db)
}

fn load_items(db: &TpccDb, rng: &mut StdRng) {
    for i_id in 1..=db.scale.items {
        db.item.load(i_id, Item {
            i_id,
            im_id: rng.random_range(1..=10_000),
            name: astring(rng, 14, 24).into(),
            price: money(rng, 100, 10_000),
            data: data_field(rng),
        });
    }
}

fn load_warehouse(db: &TpccDb, rng: &mut StdRng, w_id: i32) {
    let scale = &db.scale;
    db.warehouse.load(w_id, Warehouse {
        w_id,
        name: astring(rng, 6, 10).into(),
        city: astring(rng, 10, 20).into(),
        tax: money(rng, 0, 2000) / 100.0,
        ytd: INITIAL_W_YTD_PER_DISTRICT * f64::from(scale.districts_per_warehouse),
    });
    for i_id in 1..=scale.items {
        db.stock.load((w_id, i_id), Stock {
            i_id,
            w_id,
            quantity: rng.random_range(10..=100),
            dist: std::array::from_fn(|_| astring(rng, 24, 24).into()),
            ytd: 0,
            order_cnt: 0,
            remote_cnt: 0,
            data: data_field(rng),
        });
    }
    for d_id in 1..=scale.districts_per_warehouse {
        load_district(db, rng, w_id, d_id);
    }
}

fn load_district(db: &TpccDb, rng: &mut StdRng, w_id: i32, d_id: i32) {
    let scale = &db.scale;
    let customers = scale.customers_per_district;
    db.district.load((w_id, d_id), District {
        d_id,
        w_id,
        name: astring(rng, 6, 10).into(),
        city: astring(rng, 10, 20).into(),
        tax: money(rng, 0, 2000) / 100.0,
        ytd: INITIAL_W_YTD_PER_DISTRICT,
        next_o_id: customers + 1,
    });

    for c_id in 1..=customers {
        let last = last_name_of(scale, c_id);
        let first: SmolStr = astring(rng, 8, 16).into();
        db.customer.load((w_id, d_id, c_id), Customer {
            c_id,
            d_id,
            w_id,
            first: first.clone(),
            middle: "OE".into(),
            last: last.clone(),
            phone: nstring(rng, 16).into(),
            since: LOAD_DATE,
            credit: if rng.random_ratio(1, 10) { "BC" } else { "GC" }.into(),
            credit_lim: 50_000.0,
            discount: money(rng, 0, 5000) / 100.0,
            balance: -10.0,
            ytd_payment: 10.0,
            payment_cnt: 1,
            delivery_cnt: 0,
            data: astring(rng, 300, 500),
        });
        let key = (w_id, d_id, last);
        let mut entries = db.customer_by_name.lookup(&key).unwrap_or_default();
        let at = entries.partition_point(|e| (&e.first, e.c_id) < (&first, c_id));
        entries.insert(at, NameEntry { first, c_id });
        db.customer_by_name.load(key, entries);

        db.history.load((w_id, d_id, c_id, 0), History {
            c_id,
            c_d_id: d_id,
            c_w_id: w_id,
            d_id,
            w_id,
            date: LOAD_DATE,
            amount: 10.0,
            data: astring(rng, 12, 24),
        });
    }

    // one order per customer, in random customer order; the newest 30% are
    // still undelivered
    let mut owners: Vec<i32> = (1..=customers).collect();
    owners.shuffle(rng);
    let delivered_below = customers - customers * 3 / 10 + 1;
    for (o_id, c_id) in (1..).zip(owners) {
        let delivered = o_id < delivered_below;
        let ol_cnt = rng.random_range(5..=15);
        db.order.load((w_id, d_id, o_id), Order {
            o_id,
            d_id,
            w_id,
            c_id,
            entry_d: LOAD_DATE,
            carrier_id: delivered.then(|| rng.random_range(1..=10)),
            ol_cnt,
            all_local: true,
        });
        db.order_by_customer.load((w_id, d_id, c_id, o_id), ());
        if !delivered {
            db.new_order.load((w_id, d_id, o_id), NewOrder);
        }
        for number in 1..=ol_cnt {
            db.order_line.load((w_id, d_id, o_id, number), OrderLine {
                o_id,
                d_id,
                w_id,
                number,
                i_id: rng.random_range(1..=scale.items),
                supply_w_id: w_id,
                delivery_d: delivered.then_some(LOAD_DATE),
                quantity: 5,
                amount: if delivered {
                    0.0
                } else {
                    money(rng, 1, 999_999)
                },
                dist_info: astring(rng, 24, 24).into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_name() {
        assert_eq!(last_name(0), "BARBARBAR");
        assert_eq!(last_name(371), "PRICALLYOUGHT");
        assert_eq!(last_name(999), "EINGEINGEING");
    }

    #[test]
    fn test_load_is_deterministic() {
        let scale = ScaleConfig::small();
        let a = load(&scale).unwrap();
        let b = load(&scale).unwrap();
        assert_eq!(a.customer.lookup(&(2, 3, 17)), b.customer.lookup(&(2, 3, 17)));
        assert_eq!(a.stock.lookup(&(1, 99)), b.stock.lookup(&(1, 99)));
    }

    #[test]
    fn test_load_cardinalities() {
        let scale = ScaleConfig::small();
        let db = load(&scale).unwrap();
        let districts = (scale.warehouses * scale.districts_per_warehouse) as usize;
        let customers = districts * scale.customers_per_district as usize;
        assert_eq!(db.warehouse.len(), scale.warehouses as usize);
        assert_eq!(db.district.len(), districts);
        assert_eq!(db.customer.len(), customers);
        assert_eq!(db.order.len(), customers);
        assert_eq!(db.order_by_customer.len(), customers);
        assert_eq!(db.history.len(), customers);
        assert_eq!(db.new_order.len(), districts * 9);
        assert_eq!(db.item.len(), scale.items as usize);
        assert_eq!(db.stock.len(), (scale.items * scale.warehouses) as usize);
        // 30 customers over 10 last names
        let names = db.customer_by_name.lookup(&(1, 1, last_name(0))).unwrap();
        assert_eq!(names.len(), 3);
        assert!(names.windows(2).all(|w| w[0].first <= w[1].first));
        let district = db.district.lookup(&(1, 1)).unwrap();
        assert_eq!(district.next_o_id, 31);
        let warehouse = db.warehouse.lookup(&1).unwrap();
        assert!((warehouse.ytd - 4.0 * INITIAL_W_YTD_PER_DISTRICT).abs() < 1e-9);
    }
}
