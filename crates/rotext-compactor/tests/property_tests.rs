use proptest::prelude::*;
use rotext_compactor::arith;
use rotext_compactor::bpe::{detokenize, END_OF_WORD};
use rotext_compactor::frequency::StaticModel;
use rotext_compactor::{CompactorPipeline, ContextModel, SubwordVocabulary};
use rotext_core::{CompressorConfig, ProbabilitySource};
use std::sync::{Arc, OnceLock};

const CORPUS: &str = "Într-o dimineață senină de primăvară, copiii s-au dus la școală. \
Învățătoarea le-a citit o poveste despre țara de peste munți. Casa, casele și caselor.";

fn vocab() -> Arc<SubwordVocabulary> {
    static VOCAB: OnceLock<Arc<SubwordVocabulary>> = OnceLock::new();
    Arc::clone(VOCAB.get_or_init(|| Arc::new(SubwordVocabulary::train_from_text(CORPUS, 300).unwrap())))
}

fn source_strategy() -> impl Strategy<Value = ProbabilitySource> {
    prop_oneof![
        Just(ProbabilitySource::Contextual),
        Just(ProbabilitySource::Static),
        Just(ProbabilitySource::Uniform),
        Just(ProbabilitySource::Huffman),
        Just(ProbabilitySource::ShannonFano),
    ]
}

proptest! {
    #[test]
    fn test_subword_roundtrip(word in "[a-zăâîșțA-ZĂÂÎȘȚ]{1,16}") {
        let pieces = vocab().tokenize_word(&word);
        prop_assert!(pieces.last().unwrap().ends_with(END_OF_WORD));
        prop_assert_eq!(detokenize(&pieces), vec![word]);
    }

    #[test]
    fn test_trained_vocab_roundtrip(
        words in prop::collection::vec(("[a-zășț]{1,8}", 1..20u64), 1..30),
        budget in 0..200usize,
        unseen in "[a-zăâîșț]{1,12}",
    ) {
        let v = SubwordVocabulary::train(&words, budget).unwrap();
        prop_assert!(v.len() <= budget);
        let again = SubwordVocabulary::train(&words, budget).unwrap();
        prop_assert_eq!(v.merges(), again.merges());
        prop_assert_eq!(detokenize(&v.tokenize_word(&unseen)), vec![unseen]);
    }

    #[test]
    fn test_pipeline_roundtrip(
        text in "[a-zăâîșțA-Z ,.!\n]{1,300}",
        source in source_strategy(),
    ) {
        let mut config = CompressorConfig::default();
        config.coder.source = source;
        let pipeline = CompactorPipeline::new(&config, vocab()).unwrap();
        let result = pipeline.compress(&text).unwrap();
        prop_assert_eq!(pipeline.decompress(&result.artifact).unwrap(), text);
    }

    #[test]
    fn test_distribution_well_formed(
        tokens in prop::collection::vec("[a-c]{1,2}", 1..60),
        order in 1..5usize,
        alpha in 1..5u32,
    ) {
        let model = ContextModel::train(&tokens, order, alpha).unwrap();
        let v = model.vocabulary_size() as u64;
        for i in 0..=tokens.len() {
            let ctx = model.context_of(&tokens[..i]);
            let table = model.distribution(&ctx).unwrap();
            let cum = table.cumulative();
            prop_assert_eq!(cum[0], 0);
            prop_assert!(cum.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(table.total(), model.context_total(&ctx) + alpha as u64 * v);
            prop_assert_eq!(table.len(), model.vocabulary_size());
        }
    }
}

fn coder_case() -> impl Strategy<Value = (Vec<u64>, Vec<u32>)> {
    (2..500usize).prop_flat_map(|n| {
        (
            prop::collection::vec(1..1000u64, n),
            prop::collection::vec(0..n as u32, 1..10_000),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_coder_invertible((freqs, symbols) in coder_case()) {
        let mut model = StaticModel::new(&freqs).unwrap();
        let bytes = arith::encode(&symbols, &mut model).unwrap();
        let decoded = arith::decode(&bytes, symbols.len(), &mut model).unwrap();
        prop_assert_eq!(decoded, symbols);
    }
}
