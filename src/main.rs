fn main() {
    println!("invertyper-rs - Strand-seq inversion genotyping");
    println!();
    println!("RECOMMENDED: Use the combined tool for most workflows:");
    println!("  invertyper         - Composite BAMs + candidate intervals -> genotype calls (TSV)");
    println!();
    println!("Diagnostic tool:");
    println!("  strand_background  - Background rate and base strand state of a WW/CC composite");
    println!();
    println!("For help with each tool:");
    println!("  cargo run -- --help                            # Genotyping");
    println!("  cargo run --bin strand_background -- --help    # Composite check");
    println!();
    println!("Quick start example:");
    println!("  cargo run -- --ww-bam WW.bam --wc-bam WC.bam --intervals inversions.bed --output calls.tsv");
}
