use chrono::Local;
use donation_forecast::*;

/// Four years of monthly donations from three donors across two regions.
fn sample_csv() -> String {
    let mut csv = String::from("date,donor,campaign_type,region,total_donations_rwf\n");
    let donors = [("Umuganda Trust", "Kigali"), ("Akagera Fund", "Eastern"), ("Ishema Coop", "Kigali")];
    for year in 2020..2024 {
        for month in 1..=12u32 {
            for (idx, (donor, region)) in donors.iter().enumerate() {
                let base = 250_000.0 * (idx + 1) as f64;
                let growth = 1.0 + 0.04 * (year - 2020) as f64;
                let campaign = if month == 12 { "Year End Appeal" } else { "Monthly Giving" };
                let boost = if month == 12 { 1.8 } else { 1.0 };
                csv.push_str(&format!(
                    "{}-{:02}-{:02},{},{},{},{:.0}\n",
                    year,
                    month,
                    5 + idx * 7,
                    donor,
                    campaign,
                    region,
                    base * growth * boost
                ));
            }
        }
    }
    csv
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("📊 Donation Forecast Report Demo\n");

    let bytes = match std::env::args().nth(1) {
        Some(path) => std::fs::read(path)?,
        None => sample_csv().into_bytes(),
    };

    let table = RawTable::from_csv_bytes(&bytes)?;
    let columns = ColumnMapping::detect(&table.headers).unwrap_or_default();
    println!("🔎 Column mapping: {:?}\n", columns);

    let config = PipelineConfig {
        columns,
        horizon: 12,
        ..PipelineConfig::default()
    };
    let pipeline = DonationPipeline::new(config)?;
    let dataset = pipeline.load(&table)?;
    if dataset.dropped_count() > 0 {
        println!(
            "⚠️  Dropped {} rows ({} bad dates, {} bad amounts)\n",
            dataset.dropped_count(),
            dataset.dropped_dates(),
            dataset.dropped_amounts()
        );
    }

    let options = FilterOptions::from_records(&dataset.records);
    println!("🎛  Available regions: {:?}", options.regions);

    let filters = FilterSet::new().with_regions(["Kigali"]);
    let run = pipeline.run(&dataset, &filters)?;

    println!("\n{}", run.cover(Local::now().naive_local()).to_markdown());

    println!("## Donations by Donor\n");
    for total in run.totals_by(Dimension::Donor) {
        println!("  {:<20} {:>15}", total.key, report::format_thousands(total.total));
    }

    println!("\n## Projected Values ({} months)\n", run.forecast.horizon);
    println!("  {:<10} {:>15} {:>15} {:>15}", "Date", "Forecast", "Lower Bound", "Upper Bound");
    for row in projection_table(&run.forecast) {
        println!(
            "  {:<10} {:>15} {:>15} {:>15}",
            row.date, row.forecast, row.lower_bound, row.upper_bound
        );
    }

    println!("\n## Actual vs Forecast by Year\n");
    print!("{}", report::comparison_csv_string(&run.comparison)?);

    Ok(())
}
